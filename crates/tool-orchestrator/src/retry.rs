//! Error classification and retry logic for operation execution.
//!
//! Failures are first mapped onto a small set of [`ErrorCategory`] values.
//! Only transient categories are retried; a validation or permission problem
//! will not go away by trying again.

use crate::operation::OperationError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Coarse classification of an operation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Validation,
    Permission,
    NotFound,
    Timeout,
    Network,
    System,
    Unknown,
}

impl ErrorCategory {
    /// Whether failures in this category may succeed on a later attempt.
    ///
    /// `Validation`, `Permission` and `NotFound` are never retried.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::Timeout
                | ErrorCategory::Network
                | ErrorCategory::System
                | ErrorCategory::Unknown
        )
    }

    /// A short hint telling the user how to fix the failure.
    pub fn suggestion(self) -> Option<&'static str> {
        match self {
            ErrorCategory::Validation => Some("Check the parameters passed to the operation"),
            ErrorCategory::Permission => {
                Some("Check file permissions or configure credentials for this operation")
            }
            ErrorCategory::NotFound => Some("Verify that the path or resource exists"),
            ErrorCategory::Timeout => Some("Increase the timeout or reduce the scope of the call"),
            ErrorCategory::Network => Some("Check network connectivity and retry"),
            ErrorCategory::System => Some("Check system resources and retry"),
            ErrorCategory::Unknown => None,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Whether another attempt may succeed.
///
/// An operation that reported [`OperationError::Cancelled`] has stopped on
/// request and is never attempted again.
pub fn is_retryable(error: &OperationError) -> bool {
    !matches!(error, OperationError::Cancelled) && classify(error).is_retryable()
}

/// Maps an operation error to its category.
pub fn classify(error: &OperationError) -> ErrorCategory {
    match error {
        OperationError::InvalidParameters(_) | OperationError::Json(_) => ErrorCategory::Validation,
        OperationError::PermissionDenied(_) => ErrorCategory::Permission,
        OperationError::NotFound(_) => ErrorCategory::NotFound,
        OperationError::TimedOut(_) => ErrorCategory::Timeout,
        OperationError::Network(_) => ErrorCategory::Network,
        OperationError::Cancelled => ErrorCategory::Unknown,
        OperationError::Io(io) => classify_io(io),
        OperationError::Failed(message) => classify_message(message),
        OperationError::Other(err) => match err.downcast_ref::<std::io::Error>() {
            Some(io) => classify_io(io),
            None => classify_message(&format!("{:#}", err)),
        },
    }
}

fn classify_io(error: &std::io::Error) -> ErrorCategory {
    match error.kind() {
        ErrorKind::NotFound => ErrorCategory::NotFound,
        ErrorKind::PermissionDenied => ErrorCategory::Permission,
        ErrorKind::TimedOut => ErrorCategory::Timeout,
        ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::AddrInUse
        | ErrorKind::AddrNotAvailable
        | ErrorKind::BrokenPipe => ErrorCategory::Network,
        ErrorKind::InvalidInput | ErrorKind::InvalidData => ErrorCategory::Validation,
        _ => ErrorCategory::System,
    }
}

/// Keyword heuristics for free-form error messages.
fn classify_message(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["invalid", "validation", "malformed", "missing required", "bad request"]) {
        ErrorCategory::Validation
    } else if has(&["permission denied", "eacces", "eperm", "unauthorized", "forbidden"]) {
        ErrorCategory::Permission
    } else if has(&["not found", "enoent", "no such file", "does not exist"]) {
        ErrorCategory::NotFound
    } else if has(&["timeout", "timed out", "etimedout", "deadline exceeded"]) {
        ErrorCategory::Timeout
    } else if has(&[
        "network",
        "connection",
        "econnrefused",
        "econnreset",
        "enotfound",
        "dns",
        "socket",
        "unreachable",
    ]) {
        ErrorCategory::Network
    } else if has(&["out of memory", "enomem", "emfile", "enospc", "disk full", "resource"]) {
        ErrorCategory::System
    } else {
        ErrorCategory::Unknown
    }
}

/// Backoff policy for retryable operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor applied to the delay on each further retry.
    pub backoff_multiplier: f64,
    /// Upper bound for a single delay.
    #[serde(default)]
    pub max_delay: Option<Duration>,
    /// Adds up to 10% random jitter to each delay.
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_delay: Some(Duration::from_secs(30)),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_retries,
            base_delay,
            backoff_multiplier,
            max_delay: None,
            jitter: false,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, 1.0)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (1-based):
    /// `base_delay * backoff_multiplier^(attempt - 1)`, capped by `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let mut secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        if let Some(max) = self.max_delay {
            secs = secs.min(max.as_secs_f64());
        }
        if self.jitter && secs > 0.0 {
            secs += rand::thread_rng().gen_range(0.0..=secs * 0.1);
        }
        if !secs.is_finite() || secs < 0.0 {
            return self.max_delay.unwrap_or(self.base_delay);
        }
        Duration::from_secs_f64(secs)
    }
}

/// Result of [`execute_with_retry`].
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, OperationError>,
    /// Number of retries performed (attempts minus one).
    pub retries_attempted: u32,
}

/// Executes an operation, retrying retryable failures with exponential backoff.
///
/// - Only errors whose [`classify`] category is retryable are retried.
/// - At most `policy.max_retries` retries follow the first attempt.
/// - No further attempt starts once `cancellation` has fired.
///
/// On exhaustion the last error is returned together with the retry count.
pub async fn execute_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    cancellation: &CancellationToken,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, OperationError>>,
{
    let mut retries = 0u32;

    loop {
        match operation(retries + 1).await {
            Ok(output) => {
                if retries > 0 {
                    debug!(retries, "Operation succeeded after retry");
                }
                return RetryOutcome {
                    result: Ok(output),
                    retries_attempted: retries,
                };
            }
            Err(e) => {
                let category = classify(&e);
                let retryable = is_retryable(&e);
                if !retryable || retries >= policy.max_retries {
                    if retryable && policy.max_retries > 0 {
                        warn!(retries, error = %e, "Retries exhausted");
                    }
                    return RetryOutcome {
                        result: Err(e),
                        retries_attempted: retries,
                    };
                }
                if cancellation.is_cancelled() {
                    debug!(retries, "Cancellation requested, not retrying");
                    return RetryOutcome {
                        result: Err(e),
                        retries_attempted: retries,
                    };
                }

                retries += 1;
                let delay = policy.delay_for_attempt(retries);
                warn!(
                    attempt = retries,
                    max_retries = policy.max_retries,
                    category = %category,
                    error = %e,
                    delay = ?delay,
                    "Operation failed, retrying"
                );

                tokio::select! {
                    _ = cancellation.cancelled() => {
                        return RetryOutcome {
                            result: Err(e),
                            retries_attempted: retries - 1,
                        };
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
