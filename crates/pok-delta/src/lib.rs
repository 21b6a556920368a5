//! Delta wire format for the proof-of-knowledge ledger.
//!
//! A delta carries a contiguous run of entries in a compact, fixed-width
//! layout small enough for a single low-density optical code (400 bytes by
//! default). This is the only cross-device format in the workspace.

pub mod codec;
pub mod error;
pub mod format;

pub use codec::DeltaCodec;
pub use error::{DeltaError, DeltaResult};
pub use format::{
    entry_wire_len, max_payload_for, Delta, DEFAULT_CAPACITY, ENTRY_OVERHEAD, FORMAT_VERSION,
    HEADER_LEN,
};
