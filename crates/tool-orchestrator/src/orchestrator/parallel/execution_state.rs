//! Execution state management for parallel orchestration.
//!
//! This module provides a state machine to track the lifecycle of each call
//! while a batch is executing.

use crate::orchestrator::result::CallError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why a call never produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// An earlier level contained a failure and `fail_fast` was set.
    FailFast,
    /// The batch was cancelled before the call started.
    Cancelled,
    /// The call ran, but its level was still in flight when the batch was
    /// cancelled, so the result was dropped.
    DiscardedAfterCancellation,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::FailFast => write!(f, "skipped after an earlier failure (fail_fast)"),
            SkipReason::Cancelled => write!(f, "cancelled before start"),
            SkipReason::DiscardedAfterCancellation => {
                write!(f, "result discarded after cancellation")
            }
        }
    }
}

/// The execution state of a call.
///
/// Calls progress through states as follows:
/// - `Pending` -> `Running` (when its level starts)
/// - `Running` -> `Completed` (on success)
/// - `Running` -> `Failed` (on error)
/// - `Pending` or `Running` -> `Skipped` (fail-fast or cancellation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallState {
    /// Waiting for an earlier level to finish
    Pending,
    /// Currently executing
    Running,
    /// Completed successfully
    Completed,
    /// Failed with an error
    Failed(CallError),
    /// Never produced a result
    Skipped(SkipReason),
}

impl CallState {
    /// Terminal states are never left again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallState::Completed | CallState::Failed(_) | CallState::Skipped(_)
        )
    }
}

/// Tracks the state of every call in a batch.
///
/// # Examples
///
/// ```ignore
/// use tool_orchestrator::orchestrator::parallel::{CallState, ExecutionStateManager};
///
/// let mut manager = ExecutionStateManager::new();
/// manager.set_state("1", CallState::Running);
/// manager.set_state("2", CallState::Pending);
///
/// assert_eq!(manager.get_running_calls(), vec!["1".to_string()]);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionStateManager {
    states: HashMap<String, CallState>,
}

impl ExecutionStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager with every given call in `Pending`.
    pub fn with_pending<'a>(call_ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            states: call_ids
                .into_iter()
                .map(|id| (id.to_string(), CallState::Pending))
                .collect(),
        }
    }

    /// Sets the state of a call, adding it if unknown.
    pub fn set_state(&mut self, call_id: &str, state: CallState) {
        self.states.insert(call_id.to_string(), state);
    }

    pub fn get_state(&self, call_id: &str) -> Option<&CallState> {
        self.states.get(call_id)
    }

    pub fn call_count(&self) -> usize {
        self.states.len()
    }

    fn ids_matching(&self, predicate: impl Fn(&CallState) -> bool) -> Vec<String> {
        let mut ids: Vec<String> = self
            .states
            .iter()
            .filter(|(_, state)| predicate(state))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn get_pending_calls(&self) -> Vec<String> {
        self.ids_matching(|s| matches!(s, CallState::Pending))
    }

    pub fn get_running_calls(&self) -> Vec<String> {
        self.ids_matching(|s| matches!(s, CallState::Running))
    }

    pub fn get_skipped_calls(&self) -> Vec<String> {
        self.ids_matching(|s| matches!(s, CallState::Skipped(_)))
    }

    /// Returns every failed call with its error, sorted by id.
    pub fn get_failed_calls(&self) -> Vec<(String, CallError)> {
        let mut failed: Vec<(String, CallError)> = self
            .states
            .iter()
            .filter_map(|(id, state)| match state {
                CallState::Failed(err) => Some((id.clone(), err.clone())),
                _ => None,
            })
            .collect();
        failed.sort_by(|a, b| a.0.cmp(&b.0));
        failed
    }

    pub fn has_failures(&self) -> bool {
        self.states
            .values()
            .any(|s| matches!(s, CallState::Failed(_)))
    }

    pub fn has_pending_calls(&self) -> bool {
        self.states.values().any(|s| matches!(s, CallState::Pending))
    }

    /// True when every tracked call has reached a terminal state.
    pub fn all_terminal(&self) -> bool {
        self.states.values().all(CallState::is_terminal)
    }

    pub fn all_completed(&self) -> bool {
        !self.states.is_empty()
            && self
                .states
                .values()
                .all(|s| matches!(s, CallState::Completed))
    }

    /// Marks every still-pending call as skipped and returns their ids.
    pub fn skip_pending(&mut self, reason: SkipReason) -> Vec<String> {
        let mut skipped = Vec::new();
        for (id, state) in self.states.iter_mut() {
            if matches!(state, CallState::Pending) {
                *state = CallState::Skipped(reason);
                skipped.push(id.clone());
            }
        }
        skipped.sort();
        skipped
    }
}
