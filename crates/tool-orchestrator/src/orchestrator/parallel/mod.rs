//! Dependency-aware parallel execution of tool-call batches.
//!
//! A batch is turned into a [`DependencyGraph`], the graph into an
//! [`ExecutionPlan`] of levels, and the [`ParallelExecutor`] runs the levels
//! in order, executing the calls of one level concurrently.

pub mod dependency_analysis;
pub mod dependency_graph;
pub mod execution_state;
pub mod executor;
pub mod references;

pub use dependency_analysis::{build_dependency_graph, plan_calls};
pub use dependency_graph::{DependencyGraph, ExecutionPlan};
pub use execution_state::{CallState, ExecutionStateManager, SkipReason};
pub use executor::{CallDispatcher, ExecutionOutcome, ParallelExecutor};
pub use references::{
    FieldPath, ParamRef, PathSegment, ReferenceError, call_ref, collect_references, literal,
    resolve_parameters,
};
