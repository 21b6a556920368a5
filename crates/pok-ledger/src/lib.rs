//! Append-only proof-of-knowledge ledger.
//!
//! This crate is the heart of the workspace. It provides:
//! - [`LedgerStore`]: sequencing, timestamping and hash-linking of entries,
//!   each durably persisted before `append` returns
//! - [`Snapshot`]: point-in-time, restartable views for readers
//! - [`LedgerWriteGuard`]: the single-writer handle used by sync merges
//! - integrity verification and the blocked state that follows a failure

pub mod config;
pub mod error;
pub mod snapshot;
pub mod store;

pub use config::{LedgerConfig, DEFAULT_MAX_PAYLOAD};
pub use error::{BlockReason, LedgerError, LedgerResult};
pub use snapshot::Snapshot;
pub use store::{LedgerStore, LedgerWriteGuard, ResetConfirmation};
