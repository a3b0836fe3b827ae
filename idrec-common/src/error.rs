//! Common error types for identity reconciliation

use std::time::Duration;
use thiserror::Error;

/// Common result type for identity reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the store, the engine and the HTTP layer
///
/// `InvalidInput` and `NotFound` are terminal for a request. `Storage` and
/// `Timeout` are reported to the caller as retryable.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed request fields
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Id-addressed operation on a missing or soft-deleted contact
    #[error("Contact not found: {0}")]
    NotFound(i64),

    /// Database operation error (wraps sqlx::Error)
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Unit of work exceeded the configured transaction timeout
    #[error("Storage error: transaction timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data violates a model invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller may retry the request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_are_retryable() {
        assert!(Error::Storage(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(Error::Timeout(Duration::from_millis(10)).is_retryable());
    }

    #[test]
    fn test_request_errors_are_terminal() {
        assert!(!Error::InvalidInput("email or phoneNumber is required".into()).is_retryable());
        assert!(!Error::NotFound(7).is_retryable());
        assert!(!Error::Internal("broken link".into()).is_retryable());
    }

    #[test]
    fn test_timeout_reports_as_storage_error() {
        let msg = Error::Timeout(Duration::from_secs(5)).to_string();
        assert!(msg.starts_with("Storage error"), "got: {}", msg);
    }
}
