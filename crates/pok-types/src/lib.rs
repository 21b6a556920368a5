//! Foundation types for the proof-of-knowledge ledger.
//!
//! Every other `pok-*` crate depends on this one.
//!
//! # Key Types
//!
//! - [`Entry`]: One immutable, hash-linked learning-cycle completion record
//! - [`EntryHash`]: 32-byte BLAKE3 digest linking entries into a chain
//! - [`Timestamp`]: Wall-clock milliseconds attached to each entry

pub mod entry;
pub mod error;
pub mod hash;
pub mod temporal;

pub use entry::Entry;
pub use error::TypeError;
pub use hash::EntryHash;
pub use temporal::Timestamp;
