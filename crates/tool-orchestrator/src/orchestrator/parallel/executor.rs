//! Level-by-level execution of a planned batch.
//!
//! Levels run in order with a hard barrier between them. Within a level at
//! most `max_concurrency` calls are in flight; a permit is taken before a
//! task is spawned, so excess calls wait in the scheduling loop instead of
//! piling up as tasks.

use super::execution_state::{CallState, ExecutionStateManager, SkipReason};
use super::references::resolve_parameters;
use super::ExecutionPlan;
use crate::orchestrator::ToolCall;
use crate::orchestrator::result::{CallError, CallErrorCode, CallResult, ResultMetadata, SkippedCall};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Runs one call whose references are already resolved.
///
/// Implementations never fail: every outcome, including operation errors,
/// is captured in the returned [`CallResult`].
#[async_trait]
pub trait CallDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        call: ToolCall,
        level: usize,
        cancellation: CancellationToken,
    ) -> CallResult;
}

/// Everything the executor learned about a batch.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Results of every call that ran, in plan order.
    pub results: Vec<CallResult>,
    /// Calls that never ran or whose results were discarded, in plan order.
    pub skipped: Vec<SkippedCall>,
    pub states: ExecutionStateManager,
    /// Number of levels that were started.
    pub levels_executed: usize,
    /// Cancellation was observed.
    pub cancelled: bool,
    /// Execution stopped early because of `fail_fast`.
    pub aborted: bool,
}

/// Drives an [`ExecutionPlan`] through a [`CallDispatcher`].
#[derive(Debug, Clone, Copy)]
pub struct ParallelExecutor {
    max_concurrency: usize,
    fail_fast: bool,
    parallel: bool,
}

enum Slot {
    NotStarted,
    Running,
    Done(CallResult),
}

impl ParallelExecutor {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            fail_fast: false,
            parallel: true,
        }
    }

    /// Stop scheduling further levels after a level with a failure.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// With `false`, calls run one at a time in plan order.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        calls: &[ToolCall],
        dispatcher: Arc<dyn CallDispatcher>,
        cancellation: &CancellationToken,
    ) -> ExecutionOutcome {
        let lookup: HashMap<&str, &ToolCall> =
            calls.iter().map(|call| (call.id.as_str(), call)).collect();
        let mut states = ExecutionStateManager::with_pending(plan.order.iter().map(String::as_str));
        let mut accumulated: HashMap<String, CallResult> = HashMap::new();
        let mut results = Vec::with_capacity(calls.len());
        let mut skipped = Vec::new();
        let mut levels_executed = 0;
        let mut cancelled = false;
        let mut aborted = false;

        for (level_idx, level) in plan.levels.iter().enumerate() {
            if cancellation.is_cancelled() {
                info!(level = level_idx, "Cancellation requested, not starting level");
                cancelled = true;
                break;
            }

            levels_executed += 1;
            let level_span = info_span!("graph_level", level = level_idx, calls = level.len());
            let slots = self
                .execute_level(
                    level_idx,
                    level,
                    &lookup,
                    &accumulated,
                    &dispatcher,
                    cancellation,
                    &mut states,
                )
                .instrument(level_span)
                .await;

            if cancellation.is_cancelled() {
                // The level was still in flight: nothing it produced is reported.
                warn!(level = level_idx, "Cancelled during level, discarding its results");
                for (call_id, slot) in level.iter().zip(slots) {
                    let reason = match slot {
                        Slot::NotStarted => SkipReason::Cancelled,
                        _ => SkipReason::DiscardedAfterCancellation,
                    };
                    states.set_state(call_id, CallState::Skipped(reason));
                }
                cancelled = true;
                break;
            }

            let mut level_failed = false;
            for (call_id, slot) in level.iter().zip(slots) {
                let result = match slot {
                    Slot::Done(result) => result,
                    Slot::Running | Slot::NotStarted => {
                        let operation = lookup
                            .get(call_id.as_str())
                            .map(|c| c.operation_name.clone())
                            .unwrap_or_default();
                        lost_task_result(call_id, &operation, level_idx)
                    }
                };

                if result.success {
                    states.set_state(call_id, CallState::Completed);
                } else {
                    level_failed = true;
                    let error = result
                        .error
                        .clone()
                        .unwrap_or_else(|| CallError::new(CallErrorCode::Unknown, "unknown failure"));
                    states.set_state(call_id, CallState::Failed(error));
                }
                accumulated.insert(call_id.clone(), result.clone());
                results.push(result);
            }

            if self.fail_fast && level_failed {
                info!(
                    level = level_idx,
                    remaining_levels = plan.levels.len() - level_idx - 1,
                    "Level contained a failure, stopping (fail_fast)"
                );
                aborted = true;
                break;
            }
        }

        let pending_reason = if cancelled {
            SkipReason::Cancelled
        } else {
            SkipReason::FailFast
        };
        for call_id in plan.levels.iter().flatten() {
            if matches!(states.get_state(call_id), Some(CallState::Pending)) {
                states.set_state(call_id, CallState::Skipped(pending_reason));
            }
            if let Some(CallState::Skipped(reason)) = states.get_state(call_id) {
                skipped.push(SkippedCall {
                    call_id: call_id.clone(),
                    operation_name: lookup
                        .get(call_id.as_str())
                        .map(|c| c.operation_name.clone())
                        .unwrap_or_default(),
                    reason: *reason,
                });
            }
        }

        ExecutionOutcome {
            results,
            skipped,
            states,
            levels_executed,
            cancelled,
            aborted,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_level(
        &self,
        level_idx: usize,
        level: &[String],
        lookup: &HashMap<&str, &ToolCall>,
        accumulated: &HashMap<String, CallResult>,
        dispatcher: &Arc<dyn CallDispatcher>,
        cancellation: &CancellationToken,
        states: &mut ExecutionStateManager,
    ) -> Vec<Slot> {
        info!("Executing level {} with {} call(s)", level_idx, level.len());

        let mut slots: Vec<Slot> = level.iter().map(|_| Slot::NotStarted).collect();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (slot, call_id) in level.iter().enumerate() {
            if cancellation.is_cancelled() {
                debug!(call_id = %call_id, "Cancellation requested, not dispatching");
                break;
            }
            let Some(call) = lookup.get(call_id.as_str()) else {
                continue;
            };

            let resolved = match resolve_call(call, accumulated, level_idx) {
                Ok(resolved) => resolved,
                Err(failure) => {
                    slots[slot] = Slot::Done(failure);
                    continue;
                }
            };

            let span = info_span!(
                "tool_call",
                call_id = %call.id,
                operation = %call.operation_name,
                level = level_idx,
            );

            if !self.parallel {
                states.set_state(call_id, CallState::Running);
                let result =
                    dispatch_guarded(Arc::clone(dispatcher), resolved, level_idx, cancellation.clone())
                        .instrument(span)
                        .await;
                slots[slot] = Slot::Done(result);
                continue;
            }

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if cancellation.is_cancelled() {
                debug!(call_id = %call_id, "Cancellation requested, not dispatching");
                break;
            }

            states.set_state(call_id, CallState::Running);
            slots[slot] = Slot::Running;
            let dispatcher = Arc::clone(dispatcher);
            let token = cancellation.clone();
            tasks.spawn(
                async move {
                    let _permit = permit;
                    (slot, dispatch_guarded(dispatcher, resolved, level_idx, token).await)
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, result)) => slots[slot] = Slot::Done(result),
                Err(e) => warn!(error = %e, "Call task terminated unexpectedly"),
            }
        }

        slots
    }
}

/// Substitutes references; a failed lookup becomes the call's result.
fn resolve_call(
    call: &ToolCall,
    accumulated: &HashMap<String, CallResult>,
    level: usize,
) -> Result<ToolCall, CallResult> {
    match resolve_parameters(&call.parameters, accumulated) {
        Ok(parameters) => Ok(ToolCall {
            parameters,
            ..call.clone()
        }),
        Err(e) => {
            warn!(call_id = %call.id, error = %e, "Unresolved parameter reference");
            Err(CallResult::failure(
                &call.id,
                &call.operation_name,
                CallError::new(CallErrorCode::UnresolvedReference, e.to_string())
                    .with_suggestion("Check that the referenced call succeeded and returns the requested field"),
                ResultMetadata {
                    level,
                    ..ResultMetadata::new(Duration::ZERO)
                },
            ))
        }
    }
}

/// Dispatches one call, turning a panic into a `SYSTEM` failure.
async fn dispatch_guarded(
    dispatcher: Arc<dyn CallDispatcher>,
    call: ToolCall,
    level: usize,
    cancellation: CancellationToken,
) -> CallResult {
    let call_id = call.id.clone();
    let operation = call.operation_name.clone();

    match AssertUnwindSafe(dispatcher.dispatch(call, level, cancellation))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(call_id = %call_id, operation = %operation, panic = %message, "Operation panicked");
            CallResult::failure(
                call_id,
                operation,
                CallError::new(
                    CallErrorCode::System,
                    format!("Operation panicked: {}", message),
                ),
                ResultMetadata {
                    level,
                    ..ResultMetadata::new(Duration::ZERO)
                },
            )
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn lost_task_result(call_id: &str, operation: &str, level: usize) -> CallResult {
    CallResult::failure(
        call_id,
        operation,
        CallError::new(CallErrorCode::System, "Call task terminated without a result"),
        ResultMetadata {
            level,
            ..ResultMetadata::new(Duration::ZERO)
        },
    )
}
