//! 'tool-orchestrator' - Dependency-aware execution engine for agent tool calls.
//!
//! A reasoning layer (typically an LLM) emits a batch of tool calls; this
//! crate decides in what order they may run, runs independent calls
//! concurrently, serves repeatable calls from a result cache, asks a human
//! before running dangerous operations, and retries transient failures.
//!
//! The main entry point is [`Orchestrator`]:
//!
//! - register operations in an [`OperationRegistry`]
//! - build an [`Orchestrator`] over it
//! - hand it `Vec<ToolCall>` batches and read the [`OrchestrationResult`]
//!
//! Operations implement [`Operation`] directly, wrap a closure in
//! [`FnOperation`], or implement the typed [`Tool`] trait and register a
//! [`ToolAdapter`].

pub mod approval;
pub mod cache;
pub mod observability;
pub mod operation;
pub mod orchestrator;
pub mod registry;
pub mod retry;

pub use approval::{
    ApprovalCallback, ApprovalGate, ApprovalRequest, ApprovalResponse, ApprovalSession,
};
pub use cache::{CacheConfig, CacheStats, ResultCache};
pub use operation::{
    FnOperation, Operation, OperationContext, OperationError, OperationSpec, RiskLevel, Tool,
    ToolAdapter,
};
pub use orchestrator::{
    CallError, CallErrorCode, CallResult, ExecuteOptions, ExecutionPlan, OrchestrationResult,
    Orchestrator, OrchestratorConfig, OrchestratorError, SkipReason, ToolCall,
};
pub use registry::{OperationRegistry, OperationSummary};
pub use retry::{ErrorCategory, RetryPolicy, classify};
