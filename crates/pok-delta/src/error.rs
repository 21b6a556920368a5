use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeltaError {
    #[error("entry {index} needs {size} bytes but the delta capacity is {capacity}")]
    EntryTooLarge {
        index: u64,
        size: usize,
        capacity: usize,
    },

    #[error("malformed delta: {0}")]
    MalformedDelta(String),

    #[error("entries are not a contiguous chain at index {index}")]
    NotContiguous { index: u64 },

    #[error("capacity {capacity} is below the {min}-byte header")]
    CapacityTooSmall { capacity: usize, min: usize },
}

pub type DeltaResult<T> = Result<T, DeltaError>;
