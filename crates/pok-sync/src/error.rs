use pok_delta::DeltaError;
use pok_ledger::LedgerError;
use pok_types::EntryHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("conflict at index {index}: local {local} != remote {remote}")]
    ConflictDetected {
        index: u64,
        local: EntryHash,
        remote: EntryHash,
    },

    #[error("delta starts at index {received}, expected at most {expected}")]
    SyncGapError { expected: u64, received: u64 },

    #[error("incoming chain broken at index {index}: {reason}")]
    ChainBroken { index: u64, reason: String },

    #[error("delta error: {0}")]
    Delta(#[from] DeltaError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl SyncError {
    /// Whether this failure leaves the ledger blocked.
    pub fn blocks_ledger(&self) -> bool {
        matches!(
            self,
            Self::ConflictDetected { .. } | Self::ChainBroken { .. }
        )
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
