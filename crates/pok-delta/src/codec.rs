use bytes::{Buf, BufMut};
use pok_types::hash::HASH_LEN;
use pok_types::{Entry, EntryHash, Timestamp};
use tracing::debug;

use crate::error::{DeltaError, DeltaResult};
use crate::format::{
    entry_wire_len, Delta, DEFAULT_CAPACITY, ENTRY_OVERHEAD, ENTRY_PREFIX_LEN, FORMAT_VERSION,
    HEADER_LEN,
};

/// Encoder/decoder for bounded entry deltas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeltaCodec {
    capacity: usize,
}

impl Default for DeltaCodec {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl DeltaCodec {
    /// A codec that never emits more than `capacity` bytes.
    pub fn new(capacity: usize) -> DeltaResult<Self> {
        if capacity < HEADER_LEN {
            return Err(DeltaError::CapacityTooSmall {
                capacity,
                min: HEADER_LEN,
            });
        }
        Ok(Self { capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Encode as many of `entries`, oldest first, as fit in the capacity.
    pub fn encode(&self, entries: &[Entry]) -> DeltaResult<Vec<u8>> {
        self.encode_counted(entries).map(|(bytes, _)| bytes)
    }

    /// Like [`DeltaCodec::encode`], also returning how many entries were
    /// packed.
    ///
    /// Packing is greedy from the front and stops at the first entry that
    /// does not fit; no entry is ever partially written. Fails with
    /// [`DeltaError::EntryTooLarge`] if not even the first entry fits.
    pub fn encode_counted(&self, entries: &[Entry]) -> DeltaResult<(Vec<u8>, usize)> {
        check_contiguous(entries)?;

        let mut used = HEADER_LEN;
        let mut count = 0usize;
        for entry in entries {
            let size = entry_wire_len(entry);
            let fits = used + size <= self.capacity
                && entry.payload.len() <= u16::MAX as usize
                && count < u16::MAX as usize;
            if !fits {
                if count == 0 {
                    return Err(DeltaError::EntryTooLarge {
                        index: entry.index,
                        size: HEADER_LEN + size,
                        capacity: self.capacity,
                    });
                }
                break;
            }
            used += size;
            count += 1;
        }

        let packed = &entries[..count];
        let (start_index, anchor) = packed
            .first()
            .map(|e| (e.index, e.prev_hash))
            .unwrap_or((0, EntryHash::GENESIS));

        let mut buf = Vec::with_capacity(used);
        buf.put_u8(FORMAT_VERSION);
        buf.put_u64(start_index);
        buf.put_u16(count as u16);
        buf.put_slice(anchor.as_bytes());
        for entry in packed {
            buf.put_u64(entry.index);
            buf.put_u64(entry.timestamp.as_millis());
            buf.put_u16(entry.payload.len() as u16);
            buf.put_slice(&entry.payload);
            buf.put_slice(entry.hash.as_bytes());
        }

        debug!(start_index, count, len = buf.len(), capacity = self.capacity, "delta encoded");
        Ok((buf, count))
    }

    /// Decode a delta, rebuilding each entry's `prev_hash` from the anchor
    /// and the preceding entry.
    ///
    /// Structural checks only; whether the hashes are correct is for the
    /// merging side to decide against its own chain.
    pub fn decode(bytes: &[u8]) -> DeltaResult<Delta> {
        if bytes.len() < HEADER_LEN {
            return Err(malformed(format!(
                "truncated header: {} bytes, need {HEADER_LEN}",
                bytes.len()
            )));
        }

        let mut buf = bytes;
        let version = buf.get_u8();
        if version != FORMAT_VERSION {
            return Err(malformed(format!("unsupported version {version}")));
        }
        let start_index = buf.get_u64();
        let count = buf.get_u16();
        let anchor = read_hash(&mut buf, "anchor")?;

        let mut entries = Vec::with_capacity(entry_slots(count, buf.remaining()));
        let mut prev_hash = anchor;
        for offset in 0..u64::from(count) {
            if buf.remaining() < ENTRY_PREFIX_LEN {
                return Err(malformed(format!(
                    "declared count {count} exceeds available bytes (entry {offset} truncated)"
                )));
            }
            let index = buf.get_u64();
            let timestamp = Timestamp::from_millis(buf.get_u64());
            let payload_len = buf.get_u16() as usize;

            let expected = start_index
                .checked_add(offset)
                .ok_or_else(|| malformed("start index overflows".into()))?;
            if index != expected {
                return Err(malformed(format!(
                    "entry index {index} out of sequence, expected {expected}"
                )));
            }
            if buf.remaining() < payload_len {
                return Err(malformed(format!(
                    "payload of entry {index} truncated: {} of {payload_len} bytes",
                    buf.remaining()
                )));
            }
            let payload = buf.copy_to_bytes(payload_len).to_vec();
            let hash = read_hash(&mut buf, "entry")?;

            entries.push(Entry {
                index,
                timestamp,
                payload,
                prev_hash,
                hash,
            });
            prev_hash = hash;
        }

        if buf.has_remaining() {
            return Err(malformed(format!("{} trailing bytes", buf.remaining())));
        }

        Ok(Delta {
            start_index,
            anchor,
            entries,
        })
    }
}

/// Entries that `remaining` bytes can actually hold, whatever the header
/// claims.
fn entry_slots(count: u16, remaining: usize) -> usize {
    usize::from(count).min(remaining / ENTRY_OVERHEAD)
}

fn malformed(reason: String) -> DeltaError {
    DeltaError::MalformedDelta(reason)
}

fn read_hash(buf: &mut &[u8], what: &str) -> DeltaResult<EntryHash> {
    if buf.remaining() < HASH_LEN {
        return Err(malformed(format!(
            "{what} hash field is {} bytes, expected {HASH_LEN}",
            buf.remaining()
        )));
    }
    let mut raw = [0u8; HASH_LEN];
    buf.copy_to_slice(&mut raw);
    Ok(EntryHash::from_bytes(raw))
}

fn check_contiguous(entries: &[Entry]) -> DeltaResult<()> {
    for pair in entries.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.index != prev.index + 1 || next.prev_hash != prev.hash {
            return Err(DeltaError::NotContiguous { index: next.index });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{max_payload_for, ENTRY_OVERHEAD};
    use pok_crypto::HashChain;
    use proptest::prelude::*;

    fn chain_with_payloads(start: u64, sizes: &[usize]) -> Vec<Entry> {
        let mut prev = if start == 0 {
            EntryHash::GENESIS
        } else {
            EntryHash::from_bytes([0x5A; 32])
        };
        sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let index = start + i as u64;
                let entry = HashChain::seal(
                    prev,
                    index,
                    Timestamp::from_millis(1_700_000_000_000 + index),
                    vec![(index % 251) as u8; size],
                );
                prev = entry.hash;
                entry
            })
            .collect()
    }

    #[test]
    fn roundtrip_when_everything_fits() {
        let entries = chain_with_payloads(0, &[4, 10, 0, 7]);
        let codec = DeltaCodec::default();
        let (bytes, count) = codec.encode_counted(&entries).unwrap();
        assert_eq!(count, 4);

        let delta = DeltaCodec::decode(&bytes).unwrap();
        assert_eq!(delta.start_index, 0);
        assert_eq!(delta.anchor, EntryHash::GENESIS);
        assert_eq!(delta.entries, entries);
    }

    #[test]
    fn roundtrip_preserves_mid_ledger_anchor() {
        let entries = chain_with_payloads(11, &[3, 3]);
        let bytes = DeltaCodec::default().encode(&entries).unwrap();
        let delta = DeltaCodec::decode(&bytes).unwrap();
        assert_eq!(delta.start_index, 11);
        assert_eq!(delta.anchor, entries[0].prev_hash);
        assert_eq!(delta.entries, entries);
        assert_eq!(delta.last_index(), Some(12));
    }

    #[test]
    fn encoded_size_matches_layout() {
        let entries = chain_with_payloads(0, &[5, 9]);
        let bytes = DeltaCodec::default().encode(&entries).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 2 * ENTRY_OVERHEAD + 14);
    }

    #[test]
    fn packs_oldest_first_and_stops_cleanly() {
        // Each entry takes 50 + 60 = 110 bytes; 43 + 3 * 110 = 373 fits, a
        // fourth would reach 483.
        let entries = chain_with_payloads(0, &[60; 6]);
        let (bytes, count) = DeltaCodec::default().encode_counted(&entries).unwrap();
        assert_eq!(count, 3);
        assert_eq!(bytes.len(), 373);
        let delta = DeltaCodec::decode(&bytes).unwrap();
        assert_eq!(delta.entries, entries[..3].to_vec());
    }

    #[test]
    fn first_entry_too_large_fails() {
        let entries = chain_with_payloads(0, &[max_payload_for(DEFAULT_CAPACITY) + 1]);
        let err = DeltaCodec::default().encode(&entries).unwrap_err();
        assert_eq!(
            err,
            DeltaError::EntryTooLarge { index: 0, size: 401, capacity: 400 }
        );
    }

    #[test]
    fn largest_single_payload_fits_exactly() {
        let entries = chain_with_payloads(0, &[max_payload_for(DEFAULT_CAPACITY)]);
        let bytes = DeltaCodec::default().encode(&entries).unwrap();
        assert_eq!(bytes.len(), DEFAULT_CAPACITY);
    }

    #[test]
    fn later_oversized_entry_is_left_for_next_delta() {
        let entries = chain_with_payloads(0, &[10, 350]);
        let (_, count) = DeltaCodec::default().encode_counted(&entries).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn empty_input_encodes_empty_delta() {
        let bytes = DeltaCodec::default().encode(&[]).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        let delta = DeltaCodec::decode(&bytes).unwrap();
        assert!(delta.is_empty());
        assert_eq!(delta.anchor, EntryHash::GENESIS);
    }

    #[test]
    fn non_contiguous_input_rejected() {
        let mut entries = chain_with_payloads(0, &[1, 1, 1]);
        entries.remove(1);
        assert_eq!(
            DeltaCodec::default().encode(&entries).unwrap_err(),
            DeltaError::NotContiguous { index: 2 }
        );
    }

    #[test]
    fn capacity_below_header_rejected() {
        assert!(matches!(
            DeltaCodec::new(10).unwrap_err(),
            DeltaError::CapacityTooSmall { capacity: 10, min: 43 }
        ));
    }

    #[test]
    fn decode_truncated_header() {
        assert!(matches!(
            DeltaCodec::decode(&[1, 0, 0]).unwrap_err(),
            DeltaError::MalformedDelta(_)
        ));
    }

    #[test]
    fn decode_unknown_version() {
        let mut bytes = DeltaCodec::default().encode(&[]).unwrap();
        bytes[0] = 9;
        let err = DeltaCodec::decode(&bytes).unwrap_err();
        assert!(matches!(err, DeltaError::MalformedDelta(ref m) if m.contains("version")));
    }

    #[test]
    fn decode_count_exceeding_bytes() {
        let entries = chain_with_payloads(0, &[4]);
        let mut bytes = DeltaCodec::default().encode(&entries).unwrap();
        // Declare two entries while carrying one.
        bytes[9] = 0;
        bytes[10] = 2;
        let err = DeltaCodec::decode(&bytes).unwrap_err();
        assert!(matches!(err, DeltaError::MalformedDelta(ref m) if m.contains("exceeds")));
    }

    #[test]
    fn declared_count_does_not_size_allocation() {
        assert_eq!(entry_slots(u16::MAX, 0), 0);
        assert_eq!(entry_slots(u16::MAX, 3 * ENTRY_OVERHEAD + 10), 3);
        assert_eq!(entry_slots(2, 10 * ENTRY_OVERHEAD), 2);

        let mut header_only = vec![FORMAT_VERSION];
        header_only.extend_from_slice(&0u64.to_be_bytes());
        header_only.extend_from_slice(&u16::MAX.to_be_bytes());
        header_only.extend_from_slice(&[0u8; HASH_LEN]);
        assert_eq!(header_only.len(), HEADER_LEN);
        assert!(matches!(
            DeltaCodec::decode(&header_only).unwrap_err(),
            DeltaError::MalformedDelta(ref m) if m.contains("exceeds")
        ));
    }

    #[test]
    fn decode_short_hash_field() {
        let entries = chain_with_payloads(0, &[4]);
        let bytes = DeltaCodec::default().encode(&entries).unwrap();
        let err = DeltaCodec::decode(&bytes[..bytes.len() - 5]).unwrap_err();
        assert!(matches!(err, DeltaError::MalformedDelta(ref m) if m.contains("hash field")));
    }

    #[test]
    fn decode_out_of_sequence_index() {
        let entries = chain_with_payloads(0, &[4, 4]);
        let mut bytes = DeltaCodec::default().encode(&entries).unwrap();
        // Second entry's index field: header + first entry, last byte of u64.
        let at = HEADER_LEN + ENTRY_OVERHEAD + 4 + 7;
        bytes[at] = 7;
        let err = DeltaCodec::decode(&bytes).unwrap_err();
        assert!(matches!(err, DeltaError::MalformedDelta(ref m) if m.contains("out of sequence")));
    }

    #[test]
    fn decode_trailing_bytes() {
        let mut bytes = DeltaCodec::default().encode(&chain_with_payloads(0, &[2])).unwrap();
        bytes.push(0);
        let err = DeltaCodec::decode(&bytes).unwrap_err();
        assert!(matches!(err, DeltaError::MalformedDelta(ref m) if m.contains("trailing")));
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(
            sizes in prop::collection::vec(0usize..120, 1..30),
            capacity in 100usize..1200,
        ) {
            let entries = chain_with_payloads(0, &sizes);
            let codec = DeltaCodec::new(capacity).unwrap();
            match codec.encode_counted(&entries) {
                Ok((bytes, count)) => {
                    prop_assert!(bytes.len() <= capacity);
                    prop_assert!(count >= 1);
                    let delta = DeltaCodec::decode(&bytes).unwrap();
                    prop_assert_eq!(delta.entries, entries[..count].to_vec());
                    // Greedy: the next entry would not have fit.
                    if let Some(next) = entries.get(count) {
                        prop_assert!(bytes.len() + entry_wire_len(next) > capacity);
                    }
                }
                Err(DeltaError::EntryTooLarge { index, .. }) => {
                    prop_assert_eq!(index, 0);
                    prop_assert!(HEADER_LEN + entry_wire_len(&entries[0]) > capacity);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }

        #[test]
        fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..500)) {
            let _ = DeltaCodec::decode(&bytes);
        }
    }
}
