use serde::{Deserialize, Serialize};

use crate::hash::EntryHash;
use crate::temporal::Timestamp;

/// One learning-cycle completion record.
///
/// Created once when appended and never modified afterwards. `hash` covers
/// `prev_hash`, `payload`, `timestamp` and `index`; entry `i > 0` links to
/// the hash of entry `i - 1`, and entry 0 links to [`EntryHash::GENESIS`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Position in the ledger, contiguous from 0.
    pub index: u64,
    pub timestamp: Timestamp,
    /// Opaque result data produced by the scoring layer.
    pub payload: Vec<u8>,
    pub prev_hash: EntryHash,
    pub hash: EntryHash,
}

impl Entry {
    /// Returns `true` for the first entry of a ledger.
    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    /// Payload size in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}
