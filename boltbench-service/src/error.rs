use thiserror::Error;

use crate::backend::BackendError;

/// Errors that can occur while running a workload or poll.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An error from one of the storage backends.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Statistics were requested for a phase that recorded no samples.
    #[error("cannot compute statistics over an empty sample set")]
    EmptySampleSet,

    /// A single read did not complete before the deadline.
    #[error("read did not complete within {0:.2?}")]
    Timeout(std::time::Duration),

    /// Decoding object contents failed, e.g. an invalid gzip stream.
    #[error("failed to decode object contents: {0}")]
    Decode(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
