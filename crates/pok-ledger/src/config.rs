use serde::{Deserialize, Serialize};

/// Largest payload that still fits, alone, in a 400-byte sync delta
/// (43-byte header plus 50 bytes of per-entry framing).
pub const DEFAULT_MAX_PAYLOAD: usize = 307;

/// Ledger tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Appends with larger payloads are refused so every entry stays
    /// transferable in a single delta.
    pub max_payload_bytes: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD,
        }
    }
}
