use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cursor file unreadable: {0}")]
    CursorFile(String),

    #[error("block file unreadable: {0}")]
    BlockFile(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] pok_store::StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] pok_ledger::LedgerError),

    #[error("delta error: {0}")]
    Delta(#[from] pok_delta::DeltaError),

    #[error("sync error: {0}")]
    Sync(#[from] pok_sync::SyncError),
}

pub type SdkResult<T> = Result<T, SdkError>;
