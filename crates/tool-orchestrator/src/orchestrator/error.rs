//! Error types for orchestrator operations.

use thiserror::Error;

/// Fatal errors raised by the registry or while planning a batch.
///
/// Every variant is detected before any operation runs, so a batch that
/// fails with one of these has had no side effects. Per-call failures are
/// never reported through this type; they are recorded on the call's
/// [`CallResult`](crate::orchestrator::CallResult).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrchestratorError {
    /// An operation with the same name is already registered.
    #[error("Operation already registered: {0}")]
    DuplicateOperation(String),

    /// The operation metadata is incomplete.
    #[error("Invalid operation '{name}': {reason}")]
    InvalidOperation { name: String, reason: String },

    /// A declared operation dependency is not registered.
    #[error("Operation '{operation}' depends on unregistered operation '{dependency}'")]
    MissingDependency {
        operation: String,
        dependency: String,
    },

    /// No operation with the given name is registered.
    #[error("No operation found with name: {0}")]
    OperationNotFound(String),

    /// The call graph contains a cycle.
    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// Two calls in the same batch share an id.
    #[error("Duplicate call id in batch: {0}")]
    DuplicateCallId(String),

    /// A call lists a `depends_on` id that is not part of the batch.
    #[error("Call '{call_id}' depends on unknown call '{depends_on}'")]
    UnknownCallDependency { call_id: String, depends_on: String },

    /// A parameter reference expression could not be parsed.
    #[error("Invalid reference in call '{call_id}': {reason}")]
    InvalidReference { call_id: String, reason: String },

    /// The supplied configuration or options were rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl OrchestratorError {
    /// Creates an `InvalidOperation` error.
    pub fn invalid_operation(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns the cycle path when this is a `CircularDependency` error.
    pub fn cycle(&self) -> Option<&[String]> {
        match self {
            Self::CircularDependency { cycle } => Some(cycle),
            _ => None,
        }
    }
}
