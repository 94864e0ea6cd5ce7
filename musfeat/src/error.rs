//! Error types for musfeat
//!
//! Run-level failures are [`PipelineError`]. Failures of a single file never
//! become a `PipelineError`; they travel as
//! [`FileFailure`](crate::models::FileFailure) inside the result set.

use thiserror::Error;

/// Run-level pipeline error
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid or unreadable configuration; raised before discovery
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker plumbing failed outside the per-shard crash policy
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Shard outputs could not be mapped back onto the discovery order
    #[error("Aggregation error: {0}")]
    Aggregation(String),

    /// Result set could not be written
    #[error("Output error: {0}")]
    Output(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// musfeat-common error
    #[error("Common error: {0}")]
    Common(#[from] musfeat_common::Error),
}

impl PipelineError {
    /// Whether this error was caused by configuration (exit code 2)
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            PipelineError::Config(_)
                | PipelineError::Common(musfeat_common::Error::Config(_))
                | PipelineError::Common(musfeat_common::Error::InvalidInput(_))
        )
    }
}

/// Failure of a whole worker, as opposed to one of its files
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Worker process could not be started
    #[error("Failed to spawn worker for shard {shard}: {reason}")]
    Spawn { shard: usize, reason: String },

    /// Worker died, panicked or exited unsuccessfully
    #[error("Worker for shard {shard} crashed: {reason}")]
    Crashed { shard: usize, reason: String },

    /// Worker answered with something that is not a valid response
    #[error("Worker for shard {shard} sent an invalid response: {reason}")]
    Protocol { shard: usize, reason: String },
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
