use std::fmt;

use pok_crypto::ChainError;
use pok_store::StoreError;
use serde::{Deserialize, Serialize};

/// Why a ledger refuses further appends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BlockReason {
    /// Stored entries failed verification. Only a reset lifts this.
    Corrupted { index: u64, reason: String },
    /// A peer delta disagreed with local history at `index`.
    Conflict { index: u64, detail: String },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted { index, reason } => {
                write!(f, "integrity failure at index {index}: {reason}")
            }
            Self::Conflict { index, detail } => {
                write!(f, "sync conflict at index {index}: {detail}")
            }
        }
    }
}

/// Errors produced by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("chain broken at index {index}: {reason}")]
    ChainBroken { index: u64, reason: String },

    #[error("durable write failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("payload of {size} bytes exceeds the maximum of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("reset not confirmed; pass the exact phrase \"reset\"")]
    ResetNotConfirmed,

    #[error("ledger is blocked: {0}")]
    Blocked(BlockReason),

    #[error("ledger lock poisoned")]
    Poisoned,
}

impl From<ChainError> for LedgerError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::ChainBroken { index, fault } => Self::ChainBroken {
                index,
                reason: fault.to_string(),
            },
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
