//! # Job Error Types
//!
//! Failures captured from job bodies, plus scheduler construction errors.

use thiserror::Error;

/// Errors surfaced through job handles and the scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The job body returned an error.
    #[error("job failed: {0}")]
    Failed(String),

    /// The job body panicked; the worker survived.
    #[error("job panicked: {0}")]
    Panicked(String),

    /// A dependency failed, so this job never ran.
    #[error("dependency failed: {0}")]
    DependencyFailed(String),

    /// The scheduler was shut down before the job could be queued.
    #[error("scheduler is shut down")]
    ShutDown,

    /// Worker pool bounds are unusable.
    #[error("invalid worker bounds: min {min}, max {max}")]
    InvalidPoolBounds {
        /// Requested minimum.
        min: usize,
        /// Requested maximum.
        max: usize,
    },

    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}

impl JobError {
    /// Convenience constructor for body failures.
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self::Failed(reason.to_string())
    }
}

/// Result type for job bodies and scheduler operations.
pub type JobResult<T> = Result<T, JobError>;
