use pok_types::{Entry, EntryHash, Timestamp};

use crate::hasher::ContentHasher;

/// Hash chain linking and verification for ledger entries.
///
/// An entry's hash covers its predecessor's hash, its payload, its timestamp
/// and its index, so changing any stored byte breaks the chain at exactly
/// that entry. Linking is a pure function of its inputs; two devices given
/// the same entry always compute the same hash.
pub struct HashChain;

impl HashChain {
    /// Compute the hash of an entry from its fields.
    ///
    /// Hash input: `prev_hash ‖ payload_len ‖ payload ‖ timestamp ‖ index`,
    /// integers little-endian, under the `pok-entry-v1` domain tag.
    pub fn link(
        prev_hash: &EntryHash,
        index: u64,
        timestamp: Timestamp,
        payload: &[u8],
    ) -> EntryHash {
        let mut hasher = ContentHasher::ENTRY.begin();
        hasher.update(prev_hash.as_bytes());
        hasher.update(&(payload.len() as u64).to_le_bytes());
        hasher.update(payload);
        hasher.update(&timestamp.as_millis().to_le_bytes());
        hasher.update(&index.to_le_bytes());
        EntryHash::from_bytes(*hasher.finalize().as_bytes())
    }

    /// Recompute the hash an entry should carry given a predecessor hash.
    pub fn link_entry(prev_hash: &EntryHash, entry: &Entry) -> EntryHash {
        Self::link(prev_hash, entry.index, entry.timestamp, &entry.payload)
    }

    /// Build a correctly linked entry.
    pub fn seal(prev_hash: EntryHash, index: u64, timestamp: Timestamp, payload: Vec<u8>) -> Entry {
        let hash = Self::link(&prev_hash, index, timestamp, &payload);
        Entry {
            index,
            timestamp,
            payload,
            prev_hash,
            hash,
        }
    }

    /// Verify a full ledger: entries must start at index 0 and link back to
    /// [`EntryHash::GENESIS`].
    pub fn verify(entries: &[Entry]) -> Result<(), ChainError> {
        Self::verify_from(&EntryHash::GENESIS, 0, entries)
    }

    /// Verify a contiguous sub-range starting at `start_index` whose first
    /// entry links to `anchor`.
    ///
    /// Checks, per entry and in this order: the index is the expected one,
    /// `prev_hash` matches the preceding hash, and the stored hash matches
    /// the recomputed one. Stops at the first failure.
    pub fn verify_from(
        anchor: &EntryHash,
        start_index: u64,
        entries: &[Entry],
    ) -> Result<(), ChainError> {
        let mut expected_prev = *anchor;
        for (offset, entry) in entries.iter().enumerate() {
            let expected_index = start_index + offset as u64;
            if entry.index != expected_index {
                return Err(ChainError::ChainBroken {
                    index: entry.index,
                    fault: ChainFault::IndexGap {
                        expected: expected_index,
                    },
                });
            }

            if entry.prev_hash != expected_prev {
                return Err(ChainError::ChainBroken {
                    index: entry.index,
                    fault: ChainFault::BrokenLink,
                });
            }

            if Self::link_entry(&expected_prev, entry) != entry.hash {
                return Err(ChainError::ChainBroken {
                    index: entry.index,
                    fault: ChainFault::HashMismatch,
                });
            }

            expected_prev = entry.hash;
        }
        Ok(())
    }

    /// Boolean form of [`HashChain::verify`].
    pub fn is_valid(entries: &[Entry]) -> bool {
        Self::verify(entries).is_ok()
    }
}

/// What was wrong with the entry at which verification stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainFault {
    /// The entry's index is not the next one in sequence.
    IndexGap { expected: u64 },
    /// `prev_hash` does not match the preceding entry's hash.
    BrokenLink,
    /// The stored hash differs from the recomputed one.
    HashMismatch,
}

impl std::fmt::Display for ChainFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IndexGap { expected } => write!(f, "index gap (expected {expected})"),
            Self::BrokenLink => write!(f, "prev_hash does not match predecessor"),
            Self::HashMismatch => write!(f, "computed hash differs from stored"),
        }
    }
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain broken at index {index}: {fault}")]
    ChainBroken { index: u64, fault: ChainFault },
}

impl ChainError {
    /// Index of the first offending entry.
    pub fn index(&self) -> u64 {
        match self {
            Self::ChainBroken { index, .. } => *index,
        }
    }
}
