//! Error types reported by operations.

use std::time::Duration;
use thiserror::Error;

/// Errors an operation can return from `execute`.
///
/// Operations should pick the most specific variant they can; the retry layer
/// classifies each variant into an [`ErrorCategory`](crate::retry::ErrorCategory)
/// to decide whether the failure is worth retrying. Free-form failures
/// (`Failed`, `Other`) are classified by inspecting their message.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The supplied parameters were rejected.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The operation is not allowed to touch the requested resource.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation did not finish within its time budget.
    #[error("Operation timed out after {0:?}")]
    TimedOut(Duration),

    /// A remote endpoint could not be reached or dropped the connection.
    #[error("Network error: {0}")]
    Network(String),

    /// The operation observed the cancellation signal and stopped early.
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error raised while executing the operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The operation failed with a plain message.
    #[error("Operation failed: {0}")]
    Failed(String),

    /// Any other error bubbled up from the operation implementation.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OperationError {
    /// Creates a `Failed` error from anything string-like.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Creates an `InvalidParameters` error.
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters(message.into())
    }

    /// Creates a `Network` error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }
}
