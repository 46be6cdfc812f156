//! Human-in-the-loop approval for operations flagged `requires_approval`.
//!
//! Prompts address a single human, so the gate lets only one prompt run at a
//! time even when the surrounding calls execute in parallel. Decisions the
//! user asks to remember are stored in an [`ApprovalSession`] owned by the
//! orchestrator and applied to later calls without prompting.

use crate::operation::{OperationSpec, RiskLevel};
use crate::orchestrator::ToolCall;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// What the user is asked to approve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub call_id: String,
    pub operation_name: String,
    pub description: String,
    pub parameters: JsonValue,
    pub risk_level: RiskLevel,
}

impl ApprovalRequest {
    pub fn new(call: &ToolCall, operation: &OperationSpec) -> Self {
        Self {
            call_id: call.id.clone(),
            operation_name: operation.name.clone(),
            description: operation.description.clone(),
            parameters: call.parameters.clone(),
            risk_level: operation.risk_level,
        }
    }
}

/// The user's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub approved: bool,
    /// Apply this decision to every later call of the same operation.
    pub remember: bool,
}

impl ApprovalResponse {
    pub fn approve() -> Self {
        Self {
            approved: true,
            remember: false,
        }
    }

    pub fn deny() -> Self {
        Self {
            approved: false,
            remember: false,
        }
    }

    pub fn always_approve() -> Self {
        Self {
            approved: true,
            remember: true,
        }
    }

    pub fn always_deny() -> Self {
        Self {
            approved: false,
            remember: true,
        }
    }
}

/// Interactive prompt supplied by the UI layer.
///
/// Plain closures `Fn(&ApprovalRequest) -> ApprovalResponse` implement this
/// trait; implement it directly when the prompt needs to await.
#[async_trait]
pub trait ApprovalCallback: Send + Sync {
    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalResponse;
}

#[async_trait]
impl<F> ApprovalCallback for F
where
    F: Fn(&ApprovalRequest) -> ApprovalResponse + Send + Sync,
{
    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalResponse {
        self(request)
    }
}

/// Remembered per-operation decisions for one orchestrator session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSession {
    pub auto_approved: BTreeSet<String>,
    pub always_denied: BTreeSet<String>,
}

impl ApprovalSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// The remembered decision for an operation, if any.
    pub fn remembered(&self, operation: &str) -> Option<bool> {
        if self.auto_approved.contains(operation) {
            Some(true)
        } else if self.always_denied.contains(operation) {
            Some(false)
        } else {
            None
        }
    }

    /// Records a decision, replacing any earlier one for the operation.
    pub fn remember(&mut self, operation: &str, approved: bool) {
        if approved {
            self.always_denied.remove(operation);
            self.auto_approved.insert(operation.to_string());
        } else {
            self.auto_approved.remove(operation);
            self.always_denied.insert(operation.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.auto_approved.is_empty() && self.always_denied.is_empty()
    }
}

/// Where an approval decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionSource {
    /// Taken from the session without prompting.
    Remembered,
    /// The user was prompted.
    Prompted,
    /// No callback was configured, so the call was denied.
    NoCallback,
}

/// Result of [`ApprovalGate::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub approved: bool,
    pub source: DecisionSource,
}

/// Serializes approval prompts and owns the session memory.
#[derive(Debug, Default)]
pub struct ApprovalGate {
    /// Held for the whole request, including the prompt, so prompts never overlap.
    session: Mutex<ApprovalSession>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: ApprovalSession) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    /// Asks for approval of one call.
    ///
    /// Remembered decisions are applied without prompting. Otherwise the
    /// callback is invoked exactly once; if it asks to remember, the session
    /// is updated before the lock is released.
    pub async fn request(
        &self,
        call: &ToolCall,
        operation: &OperationSpec,
        callback: Option<&dyn ApprovalCallback>,
    ) -> ApprovalOutcome {
        let mut session = self.session.lock().await;

        if let Some(approved) = session.remembered(&operation.name) {
            debug!(
                call_id = %call.id,
                operation = %operation.name,
                approved,
                "Applying remembered approval decision"
            );
            return ApprovalOutcome {
                approved,
                source: DecisionSource::Remembered,
            };
        }

        let Some(callback) = callback else {
            info!(
                call_id = %call.id,
                operation = %operation.name,
                "No approval callback configured, denying"
            );
            return ApprovalOutcome {
                approved: false,
                source: DecisionSource::NoCallback,
            };
        };

        let request = ApprovalRequest::new(call, operation);
        let response = callback.request_approval(&request).await;
        info!(
            call_id = %call.id,
            operation = %operation.name,
            approved = response.approved,
            remember = response.remember,
            "Approval decision received"
        );

        if response.remember {
            session.remember(&operation.name, response.approved);
        }

        ApprovalOutcome {
            approved: response.approved,
            source: DecisionSource::Prompted,
        }
    }

    /// Snapshot of the remembered decisions.
    pub async fn session(&self) -> ApprovalSession {
        self.session.lock().await.clone()
    }

    /// Forgets every remembered decision.
    pub async fn reset(&self) {
        *self.session.lock().await = ApprovalSession::default();
    }
}
