//! # Server Error Types
//!
//! Startup errors (configuration, type registration) are fatal. Runtime
//! failures inside jobs never reach this type; they are captured on job
//! handles instead.

use thiserror::Error;

use tessera_core::CoreError;
use tessera_jobs::JobError;

/// Errors raised by the server crate.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A configuration value is out of range.
    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfig {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The configuration file could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    ConfigRead {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Object type registration failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Job scheduler could not start.
    #[error(transparent)]
    Jobs(#[from] JobError),

    /// The snapshot collaborator rejected a region.
    #[error("snapshot send failed: {0}")]
    Snapshot(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
