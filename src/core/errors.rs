/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export module-level errors
pub use crate::deque::DequeError;
pub use crate::lock::LockError;
pub use crate::waitable::WaitError;
pub use crate::worker::WorkerError;

/// Unified error type for the synchronization runtime.
///
/// Timeout and abort outcomes are first-class variants of the module errors
/// (not OS failures); use [`SyncError::is_timeout`] / [`SyncError::is_aborted`]
/// to match them without descending into the wrapped enum.
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum SyncError {
    #[error("Wait error: {0}")]
    #[diagnostic(transparent)]
    Wait(#[from] WaitError),

    #[error("Lock error: {0}")]
    #[diagnostic(transparent)]
    Lock(#[from] LockError),

    #[error("Deque error: {0}")]
    #[diagnostic(transparent)]
    Deque(#[from] DequeError),

    #[error("Worker error: {0}")]
    #[diagnostic(transparent)]
    Worker(#[from] WorkerError),

    #[error("Internal error: {0}")]
    #[diagnostic(
        code(sync::internal_error),
        help("An unexpected internal error occurred. Please report this issue.")
    )]
    Internal(String),
}

impl SyncError {
    /// True when the underlying outcome is "did not happen in time".
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SyncError::Lock(LockError::Timeout)
                | SyncError::Deque(DequeError::Timeout)
                | SyncError::Worker(WorkerError::Timeout)
        )
    }

    /// True when an external abort waitable cut the wait short.
    pub fn is_aborted(&self) -> bool {
        matches!(
            self,
            SyncError::Lock(LockError::Aborted) | SyncError::Deque(DequeError::Aborted)
        )
    }
}

impl From<String> for SyncError {
    fn from(msg: String) -> Self {
        SyncError::Internal(msg)
    }
}

impl From<&str> for SyncError {
    fn from(msg: &str) -> Self {
        SyncError::Internal(msg.to_string())
    }
}

/// Serializable error representation for reporting boundaries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SerializableError {
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl SerializableError {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error_type: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            details: Some(details.into()),
        }
    }
}

impl From<SyncError> for SerializableError {
    fn from(err: SyncError) -> Self {
        let error_type = match &err {
            SyncError::Wait(_) => "wait_error",
            SyncError::Lock(_) => "lock_error",
            SyncError::Deque(_) => "deque_error",
            SyncError::Worker(_) => "worker_error",
            SyncError::Internal(_) => "internal_error",
        };
        SerializableError::new(error_type, err.to_string())
    }
}

/// Result type for runtime-wide operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        let err: SyncError = DequeError::Timeout.into();
        assert!(err.is_timeout());
        assert!(!err.is_aborted());
    }

    #[test]
    fn test_abort_classification() {
        let err: SyncError = LockError::Aborted.into();
        assert!(err.is_aborted());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_serializable_error_roundtrip() {
        let error = SerializableError::with_details("lock_error", "wrong kind", "extra info");
        let json = serde_json::to_string(&error).unwrap();
        let deserialized: SerializableError = serde_json::from_str(&json).unwrap();
        assert_eq!(error, deserialized);
    }

    #[test]
    fn test_serializable_error_from_sync_error() {
        let err: SyncError = WorkerError::AlreadyStarted.into();
        let serializable: SerializableError = err.into();
        assert_eq!(serializable.error_type, "worker_error");
    }

    #[test]
    fn test_internal_error_display() {
        let error: SyncError = "test error".into();
        assert_eq!(error.to_string(), "Internal error: test error");
    }
}
