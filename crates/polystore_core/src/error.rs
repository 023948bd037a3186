//! Error types for polystore core.

use polystore_model::MappingError;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Boxed cause carried by [`CoreError::DataAccess`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in polystore core operations.
///
/// A missing record is never an error: retrieve operations return `None`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A backend fault during an entry operation.
    #[error("data access failure: {message}")]
    DataAccess {
        /// Description of the failure.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// A lock could not be acquired within the timeout.
    #[error("timed out after {timeout:?} waiting for lock on {entity} {identifier}")]
    LockTimeout {
        /// Entity name.
        entity: String,
        /// Rendered identifier.
        identifier: String,
        /// How long the caller waited.
        timeout: Duration,
    },

    /// Required settings are missing or cannot be resolved.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// Entity model error.
    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// The transaction was rolled back instead of committed.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for the abort.
        reason: String,
    },

    /// The stored version differs from the version the caller read.
    #[error(
        "optimistic locking failure on {entity} {identifier}: expected version {expected}, found {actual}"
    )]
    OptimisticLocking {
        /// Entity name.
        entity: String,
        /// Rendered identifier.
        identifier: String,
        /// Version held by the caller.
        expected: i64,
        /// Version found in the store.
        actual: i64,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Why the operation is invalid.
        message: String,
    },

    /// The session has been disconnected.
    #[error("session is closed")]
    SessionClosed,
}

impl CoreError {
    /// Creates a data access error without a cause.
    pub fn data_access(message: impl Into<String>) -> Self {
        Self::DataAccess {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a data access error wrapping a cause.
    pub fn data_access_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::DataAccess {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a lock timeout error.
    pub fn lock_timeout(
        entity: impl Into<String>,
        identifier: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self::LockTimeout {
            entity: entity.into(),
            identifier: identifier.into(),
            timeout,
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Creates an optimistic locking error.
    pub fn optimistic_locking(
        entity: impl Into<String>,
        identifier: impl Into<String>,
        expected: i64,
        actual: i64,
    ) -> Self {
        Self::OptimisticLocking {
            entity: entity.into(),
            identifier: identifier.into(),
            expected,
            actual,
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
