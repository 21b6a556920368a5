//! Durable entry log for the proof-of-knowledge ledger.
//!
//! Entries are serialized with bincode, framed with a length prefix and a
//! CRC32 checksum, and appended to a single file. Every append is flushed
//! and (by default) fsynced before it returns. On recovery, an incomplete
//! final frame is treated as a torn write and truncated. A frame whose
//! header or body is damaged is reported, never skipped, and the file is
//! left as found.

pub mod error;
pub mod file_log;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use file_log::{FileLog, LogConfig, SyncMode, MAX_FRAME_LEN};
pub use memory::MemoryLog;
pub use traits::{EntryLog, Recovery};
