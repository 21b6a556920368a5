//! In-memory entry log for tests and ephemeral ledgers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use pok_types::Entry;

use crate::error::{Result, StoreError};
use crate::file_log::HEADER_SIZE;
use crate::traits::{EntryLog, Recovery};

/// An in-memory implementation of [`EntryLog`].
///
/// Data is lost when the log is dropped. Writes can be made to fail on
/// demand with [`MemoryLog::set_fail_writes`], which lets callers exercise
/// their persistence-error paths.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<Entry>>,
    fail_writes: AtomicBool,
}

impl MemoryLog {
    /// Create a new empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log that already holds the given entries, exactly as given.
    pub fn with_entries(entries: Vec<Entry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Entry>>> {
        self.entries.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl EntryLog for MemoryLog {
    fn append_batch(&self, entries: &[Entry]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("memory log writes disabled".into()));
        }
        self.lock()?.extend_from_slice(entries);
        Ok(())
    }

    fn recover(&self) -> Result<Recovery> {
        Ok(Recovery {
            entries: self.lock()?.clone(),
            corrupt_at: None,
            torn_bytes: 0,
        })
    }

    fn truncate(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("memory log writes disabled".into()));
        }
        self.lock()?.clear();
        Ok(())
    }

    /// What the same entries would occupy as [`FileLog`](crate::FileLog)
    /// frames.
    fn len_bytes(&self) -> Result<u64> {
        self.lock()?
            .iter()
            .map(|e| bincode::serialized_size(e).map(|body| HEADER_SIZE + body))
            .sum::<bincode::Result<u64>>()
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pok_types::{EntryHash, Timestamp};

    fn entry(index: u64) -> Entry {
        Entry {
            index,
            timestamp: Timestamp::from_millis(index),
            payload: vec![index as u8; 4],
            prev_hash: EntryHash::GENESIS,
            hash: EntryHash::from_bytes([index as u8; 32]),
        }
    }

    #[test]
    fn append_and_recover() {
        let log = MemoryLog::new();
        log.append(&entry(0)).unwrap();
        log.append_batch(&[entry(1), entry(2)]).unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log.recover().unwrap().entries[2], entry(2));
        // Header, fixed entry fields and a 4-byte payload per frame.
        assert_eq!(log.len_bytes().unwrap(), 3 * (8 + 88 + 4));
    }

    #[test]
    fn failing_writes_leave_log_untouched() {
        let log = MemoryLog::new();
        log.append(&entry(0)).unwrap();
        log.set_fail_writes(true);

        let err = log.append_batch(&[entry(1), entry(2)]).unwrap_err();
        assert!(matches!(err, StoreError::WriteFailed(_)));
        assert_eq!(log.len(), 1);

        log.set_fail_writes(false);
        log.append(&entry(1)).unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn seeded_entries_are_returned_verbatim() {
        let log = MemoryLog::with_entries(vec![entry(5)]);
        let recovery = log.recover().unwrap();
        assert!(recovery.is_clean());
        assert_eq!(recovery.entries, vec![entry(5)]);
    }

    #[test]
    fn len_bytes_matches_file_log() {
        let dir = tempfile::tempdir().unwrap();
        let file = crate::FileLog::open(&dir.path().join("same.log"), Default::default()).unwrap();
        let memory = MemoryLog::new();
        let entries = vec![entry(0), entry(1)];
        file.append_batch(&entries).unwrap();
        memory.append_batch(&entries).unwrap();
        assert_eq!(memory.len_bytes().unwrap(), file.len_bytes().unwrap());
    }

    #[test]
    fn truncate_empties_log() {
        let log = MemoryLog::with_entries(vec![entry(0), entry(1)]);
        log.truncate().unwrap();
        assert!(log.is_empty());
    }
}
