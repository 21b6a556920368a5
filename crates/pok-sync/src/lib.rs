//! Offline synchronization for the proof-of-knowledge ledger.
//!
//! Devices exchange bounded deltas (see `pok-delta`) over an out-of-band
//! channel such as an optical code. There is no consensus: a merge either
//! extends the local chain with entries that link onto it, or is rejected.
//! A peer rewriting history the local device already holds is a conflict
//! and blocks the ledger.

pub mod coordinator;
pub mod error;
pub mod types;

pub use coordinator::SyncCoordinator;
pub use error::{SyncError, SyncResult};
pub use types::{CursorBook, MergePhase, MergeResult, OutgoingDelta, SyncCursor};
