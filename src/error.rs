//! Error types for the metadata engine
//!
//! Every fallible operation in this crate returns one of these classes.
//! Transactions are never partially applied: on any error the in-memory
//! working registry is discarded and the persisted registry stays untouched.

use thiserror::Error;

/// Metadata engine errors
#[derive(Debug, Error)]
pub enum MetaError {
    /// Memory allocation failed, fatal to the running transaction
    #[error("memory allocation failed")]
    Memory,

    /// The schema engine reported a failure (malformed path, unknown module,
    /// compilation problem)
    #[error("schema engine error: {0}")]
    Schema(String),

    /// An assumed invariant was false; indicates a bug, not bad input
    #[error("internal error: {0}")]
    Internal(String),

    /// A persistence or notification plugin callback failed
    #[error("plugin \"{plugin}\" {op} failed: {message}")]
    Plugin {
        /// Plugin name
        plugin: String,
        /// Callback that failed ("store", "load", "earliest")
        op: &'static str,
        /// Plugin-reported message
        message: String,
    },

    /// A platform synchronization call failed
    #[error("system call {call} failed ({errno})")]
    System {
        /// Name of the failing call
        call: &'static str,
        /// Raw errno value
        errno: i32,
    },
}

impl MetaError {
    /// Shorthand for an internal consistency error
    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        MetaError::Internal(msg.into())
    }

    /// Shorthand for a schema engine error
    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        MetaError::Schema(msg.into())
    }
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, MetaError>;
