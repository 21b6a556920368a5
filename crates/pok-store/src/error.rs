use std::io;

/// Errors produced by the entry log.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error while reading, writing or syncing the log file.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An entry could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend refused the write.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A frame is larger than the length field can describe.
    #[error("frame of {size} bytes exceeds the maximum of {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Internal lock was poisoned by a panicking writer.
    #[error("entry log lock poisoned")]
    Poisoned,
}

/// Convenience alias used throughout the store crate.
pub type Result<T> = std::result::Result<T, StoreError>;
