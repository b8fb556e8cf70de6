//! # Core Error Types
//!
//! Registration and structural errors. These are programming or
//! configuration mistakes, detected once at startup, and are fatal to
//! initialization.

use thiserror::Error;

/// Errors raised by the core crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A type's parent chain loops back on itself.
    #[error("circular type parent chain: {}", chain.join(" -> "))]
    CircularTypeParent {
        /// Type paths along the cycle, first entry repeated at the end.
        chain: Vec<String>,
    },

    /// A type names a parent that was never registered.
    #[error("type {path} declares unknown parent {parent}")]
    UnknownParentType {
        /// The declaring type.
        path: String,
        /// The missing parent.
        parent: String,
    },

    /// The same type path was registered twice.
    #[error("type {0} is already registered")]
    DuplicateType(String),

    /// Lookup of a type path that does not exist.
    #[error("unknown type {0}")]
    UnknownType(String),

    /// Type layouts were requested before `finalize` ran.
    #[error("type registry has not been finalized")]
    NotFinalized,

    /// Registration attempted after `finalize`.
    #[error("type registry is already finalized")]
    AlreadyFinalized,

    /// A type declares the same variable twice, or shadows a built-in.
    #[error("type {path} declares variable {name} more than once")]
    DuplicateVariable {
        /// The declaring type.
        path: String,
        /// The duplicated variable name.
        name: String,
    },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
