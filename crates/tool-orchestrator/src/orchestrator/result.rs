//! Per-call results and the aggregated execution report.

use crate::operation::OperationError;
use crate::orchestrator::parallel::SkipReason;
use crate::retry::{ErrorCategory, classify};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Error code recorded on a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallErrorCode {
    Validation,
    Permission,
    NotFound,
    Timeout,
    Network,
    System,
    Unknown,
    ApprovalDenied,
    UnresolvedReference,
    Cancelled,
}

impl From<ErrorCategory> for CallErrorCode {
    fn from(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Validation => CallErrorCode::Validation,
            ErrorCategory::Permission => CallErrorCode::Permission,
            ErrorCategory::NotFound => CallErrorCode::NotFound,
            ErrorCategory::Timeout => CallErrorCode::Timeout,
            ErrorCategory::Network => CallErrorCode::Network,
            ErrorCategory::System => CallErrorCode::System,
            ErrorCategory::Unknown => CallErrorCode::Unknown,
        }
    }
}

impl std::fmt::Display for CallErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            CallErrorCode::Validation => "VALIDATION",
            CallErrorCode::Permission => "PERMISSION",
            CallErrorCode::NotFound => "NOT_FOUND",
            CallErrorCode::Timeout => "TIMEOUT",
            CallErrorCode::Network => "NETWORK",
            CallErrorCode::System => "SYSTEM",
            CallErrorCode::Unknown => "UNKNOWN",
            CallErrorCode::ApprovalDenied => "APPROVAL_DENIED",
            CallErrorCode::UnresolvedReference => "UNRESOLVED_REFERENCE",
            CallErrorCode::Cancelled => "CANCELLED",
        };
        f.write_str(code)
    }
}

/// Structured error recorded on a failed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallError {
    pub code: CallErrorCode,
    pub message: String,
    /// How the user might fix the problem, when one is known.
    pub suggestion: Option<String>,
    /// Whether the failure category is considered transient.
    pub retryable: bool,
}

impl CallError {
    pub fn new(code: CallErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestion: None,
            retryable: false,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Builds a call error from an operation error, classifying it.
    pub fn from_operation_error(error: &OperationError) -> Self {
        if matches!(error, OperationError::Cancelled) {
            return Self::new(CallErrorCode::Cancelled, error.to_string());
        }
        let category = classify(error);
        Self {
            code: category.into(),
            message: error.to_string(),
            suggestion: category.suggestion().map(str::to_string),
            retryable: category.is_retryable(),
        }
    }

    pub fn approval_denied(operation: &str, reason: Option<&str>) -> Self {
        let message = match reason {
            Some(reason) => format!("Approval denied for '{}': {}", operation, reason),
            None => format!("Approval denied for '{}'", operation),
        };
        Self::new(CallErrorCode::ApprovalDenied, message)
    }
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Bookkeeping attached to every call result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Wall-clock time spent on the call, including retries.
    pub duration: Duration,
    /// Whether the payload was served from the result cache.
    pub cached: bool,
    /// Number of retries performed after the first attempt.
    pub retries_attempted: u32,
    /// Completion time in milliseconds since the UNIX epoch.
    pub timestamp_ms: u64,
    /// `Some(true)` if approval was granted, `Some(false)` if denied,
    /// `None` if the operation does not require approval.
    pub approval_granted: Option<bool>,
    /// Level of the execution plan the call ran in.
    pub level: usize,
}

impl ResultMetadata {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            timestamp_ms: current_timestamp_ms(),
            ..Default::default()
        }
    }
}

/// Outcome of a single call. Written once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub call_id: String,
    pub operation_name: String,
    pub success: bool,
    pub payload: Option<JsonValue>,
    pub error: Option<CallError>,
    pub metadata: ResultMetadata,
}

impl CallResult {
    pub fn success(
        call_id: impl Into<String>,
        operation_name: impl Into<String>,
        payload: JsonValue,
        metadata: ResultMetadata,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            operation_name: operation_name.into(),
            success: true,
            payload: Some(payload),
            error: None,
            metadata,
        }
    }

    pub fn failure(
        call_id: impl Into<String>,
        operation_name: impl Into<String>,
        error: CallError,
        metadata: ResultMetadata,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            operation_name: operation_name.into(),
            success: false,
            payload: None,
            error: Some(error),
            metadata,
        }
    }

    pub fn error_code(&self) -> Option<CallErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// A call that never produced a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedCall {
    pub call_id: String,
    pub operation_name: String,
    pub reason: SkipReason,
}

/// Aggregate numbers for one `execute` invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total_calls: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cache_hits: usize,
    /// Number of plan levels that were started.
    pub levels_used: usize,
    /// Largest level in the plan.
    pub max_parallelism: usize,
    pub total_duration: Duration,
    pub cancelled: bool,
}

/// Result of [`Orchestrator::execute`](crate::orchestrator::Orchestrator::execute).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    /// Overall outcome. With `fail_fast` this requires every call to
    /// succeed; without it, the batch must have run to completion.
    pub success: bool,
    /// Results of every call that ran, in plan order.
    pub results: Vec<CallResult>,
    /// Calls that never ran or whose results were discarded.
    pub skipped: Vec<SkippedCall>,
    pub metadata: ExecutionSummary,
}

impl OrchestrationResult {
    /// Looks up the result of one call.
    pub fn result(&self, call_id: &str) -> Option<&CallResult> {
        self.results.iter().find(|r| r.call_id == call_id)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CallResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

impl std::fmt::Display for OrchestrationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = &self.metadata;
        writeln!(
            f,
            "{} call(s): {} succeeded, {} failed, {} skipped, {} cache hit(s), {} level(s) in {:?}",
            m.total_calls,
            m.successful,
            m.failed,
            m.skipped,
            m.cache_hits,
            m.levels_used,
            m.total_duration
        )?;

        for result in &self.results {
            let mut flags = Vec::new();
            if result.metadata.cached {
                flags.push("cached".to_string());
            }
            if result.metadata.retries_attempted > 0 {
                flags.push(format!("{} retries", result.metadata.retries_attempted));
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(", {}", flags.join(", "))
            };

            match &result.error {
                None => writeln!(
                    f,
                    "  [ok] {} {} ({:?}{})",
                    result.call_id, result.operation_name, result.metadata.duration, flags
                )?,
                Some(error) => {
                    writeln!(
                        f,
                        "  [failed] {} {}: {}{}",
                        result.call_id, result.operation_name, error, flags
                    )?;
                    if let Some(suggestion) = &error.suggestion {
                        writeln!(f, "    suggestion: {}", suggestion)?;
                    }
                }
            }
        }

        for skipped in &self.skipped {
            writeln!(
                f,
                "  [skipped] {} {}: {}",
                skipped.call_id, skipped.operation_name, skipped.reason
            )?;
        }
        Ok(())
    }
}

/// Returns the current system time in milliseconds since UNIX_EPOCH.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
