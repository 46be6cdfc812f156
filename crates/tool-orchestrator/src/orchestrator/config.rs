//! Configuration for the orchestrator and for individual `execute` calls.

use crate::approval::ApprovalCallback;
use crate::cache::CacheConfig;
use crate::orchestrator::OrchestratorError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Long-lived orchestrator settings.
///
/// Every field has a serde default, so partial documents deserialize.
///
/// # Examples
///
/// ```ignore
/// use tool_orchestrator::orchestrator::OrchestratorConfig;
/// use std::time::Duration;
///
/// let config = OrchestratorConfig::new()
///     .with_max_concurrency(8)
///     .with_default_timeout(Duration::from_secs(30))
///     .with_fail_fast(true);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Run the calls of one level concurrently.
    ///
    /// **Default:** `true`
    pub parallel: bool,

    /// Stop scheduling further levels once a level contains a failure.
    ///
    /// **Default:** `false`
    pub fail_fast: bool,

    /// Serve and store results of `cacheable` operations.
    ///
    /// **Default:** `true`
    pub enable_cache: bool,

    /// Maximum number of calls in flight within one level.
    ///
    /// **Default:** 4
    pub max_concurrency: usize,

    /// Per-attempt timeout for operations that declare none.
    ///
    /// **Default:** `None` (no timeout)
    pub default_timeout: Option<Duration>,

    /// Backoff policy for `retryable` operations.
    pub retry: RetryPolicy,

    /// Result cache sizing and expiry. Fixed when the orchestrator is built.
    pub cache: CacheConfig,

    /// Directory handed to operations for resolving relative paths.
    ///
    /// **Default:** `.`
    pub working_directory: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self {
            parallel: true,
            fail_fast: false,
            enable_cache: true,
            max_concurrency: 4,
            default_timeout: None,
            retry: RetryPolicy::default(),
            cache: CacheConfig::default(),
            working_directory: PathBuf::from("."),
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_cache_enabled(mut self, enable: bool) -> Self {
        self.enable_cache = enable;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn with_no_timeout(mut self) -> Self {
        self.default_timeout = None;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache_config(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = dir.into();
        self
    }

    /// Rejects settings the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.max_concurrency == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "cache.max_entries must be at least 1".into(),
            ));
        }
        let multiplier = self.retry.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(OrchestratorError::InvalidConfig(format!(
                "retry.backoff_multiplier must be >= 1.0, got {}",
                self.retry.backoff_multiplier
            )));
        }
        Ok(())
    }
}

/// Options for one [`Orchestrator::execute`](crate::orchestrator::Orchestrator::execute) call.
///
/// Start from [`Orchestrator::execute_options`](crate::orchestrator::Orchestrator::execute_options)
/// and override per batch. The approval callback and the cancellation token
/// live here because they are not serializable.
///
/// `ExecuteOptions::default()` is built from `OrchestratorConfig::default()`,
/// not from any orchestrator's config: an orchestrator configured with
/// `fail_fast` or a timeout does not pass those on to default options.
#[derive(Clone)]
pub struct ExecuteOptions {
    pub parallel: bool,
    pub fail_fast: bool,
    pub enable_cache: bool,
    pub max_concurrency: usize,
    /// Per-attempt timeout for operations that declare none.
    pub timeout: Option<Duration>,
    /// Prompt for approval-required operations. Without one they are denied.
    pub approval_callback: Option<Arc<dyn ApprovalCallback>>,
    /// Cancels the batch. Checked before each level and each dispatch.
    pub cancellation: Option<CancellationToken>,
}

impl Default for ExecuteOptions {
    /// Built-in defaults. Use `Orchestrator::execute_options()` to inherit a
    /// configured orchestrator's settings.
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default())
    }
}

impl std::fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("parallel", &self.parallel)
            .field("fail_fast", &self.fail_fast)
            .field("enable_cache", &self.enable_cache)
            .field("max_concurrency", &self.max_concurrency)
            .field("timeout", &self.timeout)
            .field("approval_callback", &self.approval_callback.is_some())
            .field("cancellation", &self.cancellation.is_some())
            .finish()
    }
}

impl ExecuteOptions {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            parallel: config.parallel,
            fail_fast: config.fail_fast,
            enable_cache: config.enable_cache,
            max_concurrency: config.max_concurrency,
            timeout: config.default_timeout,
            approval_callback: None,
            cancellation: None,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_cache_enabled(mut self, enable: bool) -> Self {
        self.enable_cache = enable;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_approval_callback(mut self, callback: impl ApprovalCallback + 'static) -> Self {
        self.approval_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.max_concurrency == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "max_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{ApprovalRequest, ApprovalResponse};

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert!(config.parallel);
        assert!(!config.fail_fast);
        assert!(config.enable_cache);
        assert_eq!(config.max_concurrency, 4);
        assert!(config.default_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = OrchestratorConfig::new()
            .with_max_concurrency(10)
            .with_default_timeout(Duration::from_secs(600))
            .with_fail_fast(true)
            .with_working_directory("/tmp/project");

        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.default_timeout, Some(Duration::from_secs(600)));
        assert!(config.fail_fast);
        assert_eq!(config.working_directory, PathBuf::from("/tmp/project"));
    }

    #[test]
    fn test_with_no_timeout() {
        let config = OrchestratorConfig::new()
            .with_default_timeout(Duration::from_secs(300))
            .with_no_timeout();
        assert!(config.default_timeout.is_none());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: OrchestratorConfig =
            serde_json::from_str(r#"{"fail_fast": true, "max_concurrency": 2}"#).unwrap();
        assert!(config.fail_fast);
        assert_eq!(config.max_concurrency, 2);
        assert!(config.parallel);
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(matches!(
            OrchestratorConfig::new().with_max_concurrency(0).validate(),
            Err(OrchestratorError::InvalidConfig(_))
        ));
        assert!(
            OrchestratorConfig::new()
                .with_cache_config(CacheConfig {
                    max_entries: 0,
                    ..CacheConfig::default()
                })
                .validate()
                .is_err()
        );
        assert!(
            OrchestratorConfig::new()
                .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(10), 0.5))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_execute_options_from_config() {
        let config = OrchestratorConfig::new()
            .with_parallel(false)
            .with_default_timeout(Duration::from_secs(5));
        let options = ExecuteOptions::from_config(&config)
            .with_approval_callback(|_: &ApprovalRequest| ApprovalResponse::approve());

        assert!(!options.parallel);
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert!(options.approval_callback.is_some());
        assert!(format!("{:?}", options).contains("approval_callback: true"));
        assert!(options.with_max_concurrency(0).validate().is_err());
    }
}
