//! Purge Engine Error Hierarchy
//!
//! Two layers of errors:
//! - [`StoreError`]: the closed set produced at the store-adapter boundary. Workers match
//!   it exhaustively to decide between retry, segment abort and run abort.
//! - [`Error`]: crate level failures surfaced past a worker or to the binary.

use config::ConfigError;
use tokio::task::JoinError;

use crate::PurgeState;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

/// Result type returned by [`crate::TableStore`] implementations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration source parsing/merging failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The table's primary key could not be determined. Fatal, raised before any scan.
    #[error("Key schema unavailable for table {table}: {reason}")]
    SchemaUnavailable { table: String, reason: String },

    /// Store failures surfaced past the worker boundary
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Log file setup failures
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Orchestrator state machine violations
    #[error("Invalid purge state transition from {from:?} to {to:?}")]
    InvalidStateTransition { from: PurgeState, to: PurgeState },

    /// Worker task panicked or was cancelled by the runtime
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Table missing or its key schema cannot be reported
    #[error("Key schema unavailable for table {table}: {reason}")]
    SchemaUnavailable { table: String, reason: String },

    /// Request rejected for capacity reasons. Retryable with backoff.
    #[error("Request throttled: {0}")]
    Throttled(String),

    /// Any other store failure. Fatal to the owning segment.
    #[error("Store request failed: {0}")]
    NonRetryable(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Throttled(_) => true,
            StoreError::SchemaUnavailable { .. } | StoreError::NonRetryable(_) => false,
        }
    }
}
