//! Per-call pipeline: cache lookup, approval, timed and retried invocation,
//! cache write.

use super::parallel::CallDispatcher;
use super::result::{CallError, CallErrorCode, CallResult, ResultMetadata};
use super::ToolCall;
use crate::approval::{ApprovalCallback, ApprovalGate, DecisionSource};
use crate::cache::ResultCache;
use crate::operation::{Operation, OperationContext, OperationError};
use crate::registry::OperationRegistry;
use crate::retry::{RetryOutcome, RetryPolicy, execute_with_retry};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, warn};

/// Shared state plus the per-batch options a call needs.
pub(crate) struct CallPipeline {
    pub(crate) registry: Arc<OperationRegistry>,
    pub(crate) cache: Arc<ResultCache>,
    pub(crate) approvals: Arc<ApprovalGate>,
    pub(crate) retry: RetryPolicy,
    pub(crate) working_directory: PathBuf,
    pub(crate) enable_cache: bool,
    pub(crate) timeout: Option<Duration>,
    pub(crate) approval_callback: Option<Arc<dyn ApprovalCallback>>,
}

#[async_trait]
impl CallDispatcher for CallPipeline {
    async fn dispatch(
        &self,
        call: ToolCall,
        level: usize,
        cancellation: CancellationToken,
    ) -> CallResult {
        let started = Instant::now();
        let base_metadata = ResultMetadata {
            level,
            ..ResultMetadata::default()
        };

        let operation = match self.registry.get(&call.operation_name) {
            Ok(operation) => operation,
            Err(e) => {
                return CallResult::failure(
                    &call.id,
                    &call.operation_name,
                    CallError::new(CallErrorCode::NotFound, e.to_string()),
                    base_metadata,
                );
            }
        };
        let spec = operation.spec();
        let use_cache = self.enable_cache && spec.cacheable;

        if use_cache {
            if let Some(payload) = self.cache.get(&spec.name, &call.parameters) {
                debug!(call_id = %call.id, operation = %spec.name, "Serving result from cache");
                return CallResult::success(
                    &call.id,
                    &spec.name,
                    payload,
                    ResultMetadata {
                        cached: true,
                        level,
                        ..ResultMetadata::new(started.elapsed())
                    },
                );
            }
        }

        let mut approval_granted = None;
        if spec.requires_approval {
            let outcome = self
                .approvals
                .request(&call, spec, self.approval_callback.as_deref())
                .await;
            approval_granted = Some(outcome.approved);

            if !outcome.approved {
                let mut error = CallError::approval_denied(&spec.name, None);
                if outcome.source == DecisionSource::NoCallback {
                    error = error.with_suggestion(
                        "Configure an approval callback in ExecuteOptions to allow this operation",
                    );
                }
                return CallResult::failure(
                    &call.id,
                    &spec.name,
                    error,
                    ResultMetadata {
                        approval_granted,
                        level,
                        ..ResultMetadata::new(started.elapsed())
                    },
                );
            }
        }

        if cancellation.is_cancelled() {
            return CallResult::failure(
                &call.id,
                &spec.name,
                CallError::from_operation_error(&OperationError::Cancelled),
                ResultMetadata {
                    approval_granted,
                    level,
                    ..ResultMetadata::new(started.elapsed())
                },
            );
        }

        let timeout = spec.timeout.or(self.timeout);
        let context = OperationContext::new(
            &call.id,
            &self.working_directory,
            cancellation.clone(),
            Span::current(),
        );

        let outcome = if spec.retryable {
            execute_with_retry(&self.retry, &cancellation, |attempt| {
                if attempt > 1 {
                    debug!(call_id = %call.id, attempt, "Retrying operation");
                }
                run_attempt(operation.as_ref(), call.parameters.clone(), &context, timeout)
            })
            .await
        } else {
            RetryOutcome {
                result: run_attempt(operation.as_ref(), call.parameters.clone(), &context, timeout)
                    .await,
                retries_attempted: 0,
            }
        };

        let metadata = ResultMetadata {
            retries_attempted: outcome.retries_attempted,
            approval_granted,
            level,
            ..ResultMetadata::new(started.elapsed())
        };

        match outcome.result {
            Ok(payload) => {
                let result = CallResult::success(&call.id, &spec.name, payload, metadata);
                if use_cache {
                    self.cache.set(spec, &call.parameters, &result);
                }
                info!(
                    call_id = %call.id,
                    operation = %spec.name,
                    duration = ?result.metadata.duration,
                    retries = result.metadata.retries_attempted,
                    "Call completed"
                );
                result
            }
            Err(e) => {
                let error = CallError::from_operation_error(&e);
                warn!(
                    call_id = %call.id,
                    operation = %spec.name,
                    code = %error.code,
                    retries = metadata.retries_attempted,
                    error = %e,
                    "Call failed"
                );
                CallResult::failure(&call.id, &spec.name, error, metadata)
            }
        }
    }
}

/// One invocation, bounded by the timeout when one applies.
async fn run_attempt(
    operation: &dyn Operation,
    parameters: JsonValue,
    context: &OperationContext,
    timeout: Option<Duration>,
) -> Result<JsonValue, OperationError> {
    let execution = operation.execute(parameters, context);
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, execution).await {
            Ok(result) => result,
            Err(_) => {
                warn!(call_id = %context.call_id(), timeout = ?limit, "Operation timed out");
                Err(OperationError::TimedOut(limit))
            }
        },
        None => execution.await,
    }
}
