use pok_types::Entry;

use crate::error::Result;

/// Outcome of reading a log back from durable storage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Recovery {
    /// Entries decoded from intact frames, in log order.
    pub entries: Vec<Entry>,
    /// Position of the first record with a damaged header, a failed
    /// checksum or an undecodable body. Recovery stops there; nothing after
    /// it is returned.
    pub corrupt_at: Option<u64>,
    /// Bytes of an incomplete trailing frame that were truncated away.
    pub torn_bytes: u64,
}

impl Recovery {
    /// Returns `true` if every stored record was read back intact.
    pub fn is_clean(&self) -> bool {
        self.corrupt_at.is_none()
    }
}

/// Durable, append-only storage for ledger entries.
///
/// Implementations must not report success for a write that is not durable,
/// and a failed `append_batch` must leave the log exactly as it was.
pub trait EntryLog: Send + Sync {
    /// Durably append one entry.
    fn append(&self, entry: &Entry) -> Result<()> {
        self.append_batch(std::slice::from_ref(entry))
    }

    /// Durably append several entries as one unit.
    fn append_batch(&self, entries: &[Entry]) -> Result<()>;

    /// Read every stored entry back.
    fn recover(&self) -> Result<Recovery>;

    /// Remove all stored entries.
    fn truncate(&self) -> Result<()>;

    /// Size of the stored log in bytes, as framed on disk.
    fn len_bytes(&self) -> Result<u64>;
}
