//! Wire layout constants and the decoded [`Delta`] type.
//!
//! All integers are big-endian.
//!
//! ```text
//! header (43 bytes)
//!   [1]  version
//!   [8]  start index
//!   [2]  entry count
//!   [32] anchor hash (prev_hash of the first entry)
//! per entry (50 bytes + payload)
//!   [8]  index
//!   [8]  timestamp ms
//!   [2]  payload length
//!   [N]  payload
//!   [32] hash
//! ```

use pok_types::{Entry, EntryHash};

pub const FORMAT_VERSION: u8 = 1;

/// Default delta budget: one low-density optical code.
pub const DEFAULT_CAPACITY: usize = 400;

pub const HEADER_LEN: usize = 1 + 8 + 2 + 32;

/// Fixed per-entry bytes, excluding the payload itself.
pub const ENTRY_OVERHEAD: usize = 8 + 8 + 2 + 32;

/// Fixed per-entry bytes that precede the payload.
pub(crate) const ENTRY_PREFIX_LEN: usize = 8 + 8 + 2;

/// Encoded size of one entry.
pub fn entry_wire_len(entry: &Entry) -> usize {
    ENTRY_OVERHEAD + entry.payload.len()
}

/// Largest payload that fits, alone, in a delta of `capacity` bytes.
pub const fn max_payload_for(capacity: usize) -> usize {
    capacity.saturating_sub(HEADER_LEN + ENTRY_OVERHEAD)
}

/// A decoded delta: a contiguous, internally linked run of entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delta {
    /// Index of the first carried entry.
    pub start_index: u64,
    /// Hash the first entry links to.
    pub anchor: EntryHash,
    pub entries: Vec<Entry>,
}

impl Delta {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the last carried entry.
    pub fn last_index(&self) -> Option<u64> {
        self.entries.last().map(|e| e.index)
    }
}
