//! Orchestrator - dependency-aware execution of tool-call batches.
//!
//! The orchestrator takes a batch of [`ToolCall`]s produced by a reasoning
//! layer, validates it against the [`OperationRegistry`], plans it into
//! levels and runs every level concurrently. Each call goes through the same
//! pipeline:
//!
//! 1. result cache lookup (`cacheable` operations)
//! 2. approval gate (`requires_approval` operations)
//! 3. invocation with per-attempt timeout, retried when `retryable`
//! 4. cache write on success
//!
//! Plan-time problems (unknown operations, duplicate ids, cycles, malformed
//! references) are returned as [`OrchestratorError`] before anything runs.
//! Everything that goes wrong at run time is recorded on the call's
//! [`CallResult`] instead.
//!
//! A call consumes an earlier result through a `{"$call.ref": "<id>", "path": "..."}`
//! object in its parameters (see [`parallel::call_ref`]). Strings are never
//! interpreted; wrap data that must contain a marker key in
//! [`parallel::literal`].
//!
//! # Example
//!
//! ```rust,ignore
//! use tool_orchestrator::orchestrator::{Orchestrator, ToolCall, parallel::call_ref};
//!
//! let orchestrator = Orchestrator::with_config(registry, config)?;
//! let calls = vec![
//!     ToolCall::new("1", "list_files").with_parameters(json!({"dir": "src"})),
//!     ToolCall::new("2", "read_file")
//!         .with_parameters(json!({"path": call_ref("1", "files[0]")?})),
//! ];
//!
//! let report = orchestrator
//!     .execute(&calls, orchestrator.execute_options())
//!     .await?;
//! println!("{}", report);
//! ```

pub mod call;
pub mod config;
pub mod error;
pub mod parallel;
mod pipeline;
pub mod result;

pub use call::ToolCall;
pub use config::{ExecuteOptions, OrchestratorConfig};
pub use error::OrchestratorError;
pub use parallel::{
    CallState, DependencyGraph, ExecutionPlan, ExecutionStateManager, ParallelExecutor,
    SkipReason,
};
pub use result::{
    CallError, CallErrorCode, CallResult, ExecutionSummary, OrchestrationResult, ResultMetadata,
    SkippedCall, current_timestamp_ms,
};

use crate::approval::{ApprovalGate, ApprovalSession};
use crate::cache::{CacheStats, ResultCache};
use crate::registry::{OperationRegistry, OperationSummary};
use parallel::plan_calls;
use pipeline::CallPipeline;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{Instrument, info, info_span};

/// Executes batches of tool calls against a fixed set of operations.
///
/// The result cache and the approval memory live as long as the
/// orchestrator and are shared by every batch it runs.
pub struct Orchestrator {
    registry: Arc<OperationRegistry>,
    cache: Arc<ResultCache>,
    approvals: Arc<ApprovalGate>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator with the default configuration.
    ///
    /// Fails with `MissingDependency` if an operation declares a dependency
    /// on an operation that is not registered.
    pub fn new(registry: OperationRegistry) -> Result<Self, OrchestratorError> {
        Self::with_config(registry, OrchestratorConfig::default())
    }

    pub fn with_config(
        registry: OperationRegistry,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        registry.validate_all()?;

        info!(
            operations = registry.len(),
            max_concurrency = config.max_concurrency,
            "Orchestrator created"
        );

        Ok(Self {
            registry: Arc::new(registry),
            cache: Arc::new(ResultCache::new(config.cache.clone())),
            approvals: Arc::new(ApprovalGate::new()),
            config,
        })
    }

    /// Restores approval decisions remembered in an earlier session.
    pub fn with_approval_session(mut self, session: ApprovalSession) -> Self {
        self.approvals = Arc::new(ApprovalGate::with_session(session));
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Summaries of every registered operation, in registration order.
    pub fn list_operations(&self) -> Vec<OperationSummary> {
        self.registry.list()
    }

    /// Options for [`execute`](Self::execute) derived from this orchestrator's config.
    pub fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions::from_config(&self.config)
    }

    /// Validates a batch and returns its plan without running anything.
    pub fn plan(&self, calls: &[ToolCall]) -> Result<ExecutionPlan, OrchestratorError> {
        plan_calls(calls, &self.registry)
    }

    /// Executes a batch.
    ///
    /// Returns `Err` only for plan-time problems, in which case no operation
    /// has run. Otherwise the report holds one entry per call, either in
    /// `results` or in `skipped`.
    ///
    /// `success` is `true` when the batch ran to completion without being
    /// cancelled; with `fail_fast` every call must also have succeeded.
    pub async fn execute(
        &self,
        calls: &[ToolCall],
        options: ExecuteOptions,
    ) -> Result<OrchestrationResult, OrchestratorError> {
        let span = info_span!(
            "orchestrator_execute",
            total_calls = calls.len(),
            fail_fast = options.fail_fast,
            parallel = options.parallel,
        );

        async move {
            options.validate()?;
            let started = Instant::now();
            let plan = plan_calls(calls, &self.registry)?;
            info!(
                levels = plan.level_count(),
                max_parallelism = plan.max_parallelism(),
                "Starting execution of {} call(s)",
                calls.len()
            );

            let pipeline = Arc::new(CallPipeline {
                registry: Arc::clone(&self.registry),
                cache: Arc::clone(&self.cache),
                approvals: Arc::clone(&self.approvals),
                retry: self.config.retry.clone(),
                working_directory: self.config.working_directory.clone(),
                enable_cache: options.enable_cache,
                timeout: options.timeout,
                approval_callback: options.approval_callback.clone(),
            });
            let cancellation = options.cancellation.clone().unwrap_or_default();
            let executor = ParallelExecutor::new(options.max_concurrency)
                .with_fail_fast(options.fail_fast)
                .with_parallel(options.parallel);

            let outcome = executor
                .execute(&plan, calls, pipeline, &cancellation)
                .await;

            let successful = outcome.results.iter().filter(|r| r.success).count();
            let failed = outcome.results.len() - successful;
            let cache_hits = outcome
                .results
                .iter()
                .filter(|r| r.metadata.cached)
                .count();
            let success = !outcome.cancelled && (!options.fail_fast || failed == 0);

            let metadata = ExecutionSummary {
                total_calls: calls.len(),
                successful,
                failed,
                skipped: outcome.skipped.len(),
                cache_hits,
                levels_used: outcome.levels_executed,
                max_parallelism: plan.max_parallelism(),
                total_duration: started.elapsed(),
                cancelled: outcome.cancelled,
            };

            info!(
                success,
                successful,
                failed,
                skipped = metadata.skipped,
                cache_hits,
                duration = ?metadata.total_duration,
                "Execution finished"
            );

            Ok(OrchestrationResult {
                success,
                results: outcome.results,
                skipped: outcome.skipped,
                metadata,
            })
        }
        .instrument(span)
        .await
    }

    /// Drops every cached result.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Snapshot of the remembered approval decisions, for persisting.
    pub async fn approval_session(&self) -> ApprovalSession {
        self.approvals.session().await
    }

    /// Forgets every remembered approval decision.
    pub async fn reset_approvals(&self) {
        self.approvals.reset().await;
    }
}
