//! The operation contract consumed by the orchestrator.
//!
//! An operation ("tool") is a named, parameterized unit of work. The
//! orchestrator never interprets an operation's parameters or results; it only
//! needs the metadata in [`OperationSpec`] (flags, declared dependencies,
//! timeout) and the ability to call [`Operation::execute`].
//!
//! Two ways to provide an operation:
//!
//! - Implement [`Operation`] directly, working with `serde_json::Value` in and out.
//! - Implement the typed [`Tool`] trait and wrap it in a [`ToolAdapter`], which
//!   performs serde conversion (parameter decoding failures become
//!   `OperationError::InvalidParameters`).
//!
//! For tests and small glue code, [`FnOperation`] wraps an async closure.
//!
//! # Example
//!
//! ```rust,ignore
//! use tool_orchestrator::operation::{FnOperation, OperationSpec};
//! use serde_json::json;
//!
//! let list_files = FnOperation::new(
//!     OperationSpec::new("list_files", "List files in a directory")
//!         .with_parameters_schema(json!({"type": "object"}))
//!         .cacheable(true),
//!     |_params, ctx| async move {
//!         Ok(json!({"cwd": ctx.working_directory().display().to_string()}))
//!     },
//! );
//! ```

pub mod error;

pub use error::OperationError;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Span;

/// How dangerous an operation is, forwarded to the approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// Static metadata describing a registered operation.
///
/// Immutable once the operation is registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Unique name within a registry.
    pub name: String,
    /// Human-readable description, shown to the reasoning layer and in approval prompts.
    pub description: String,
    /// JSON Schema of the parameter bag. `Null` means "not provided" and is
    /// rejected at registration.
    #[serde(default)]
    pub parameters_schema: JsonValue,
    /// Names of other operations this one depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Whether a human must confirm each call before it runs.
    #[serde(default)]
    pub requires_approval: bool,
    /// Whether successful results may be memoized.
    #[serde(default)]
    pub cacheable: bool,
    /// Whether transient failures may be retried with backoff.
    #[serde(default)]
    pub retryable: bool,
    /// Per-operation timeout, overriding the global one.
    #[serde(default)]
    pub timeout: Option<Duration>,
    /// Risk level reported to the approval prompt.
    #[serde(default)]
    pub risk_level: RiskLevel,
}

impl OperationSpec {
    /// Creates a spec with the given name and description and all flags off.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema: JsonValue::Null,
            dependencies: Vec::new(),
            requires_approval: false,
            cacheable: false,
            retryable: false,
            timeout: None,
            risk_level: RiskLevel::Low,
        }
    }

    /// Sets the JSON Schema describing the parameter bag.
    pub fn with_parameters_schema(mut self, schema: JsonValue) -> Self {
        self.parameters_schema = schema;
        self
    }

    /// Derives the parameter schema from a Rust type.
    #[cfg(feature = "schema")]
    pub fn with_schema_for<P: schemars::JsonSchema>(mut self) -> Self {
        let schema = schemars::schema_for!(P);
        self.parameters_schema = serde_json::to_value(schema).unwrap_or(JsonValue::Null);
        self
    }

    /// Declares a dependency on another operation by name.
    pub fn depends_on(mut self, operation: impl Into<String>) -> Self {
        self.dependencies.push(operation.into());
        self
    }

    pub fn requires_approval(mut self, required: bool) -> Self {
        self.requires_approval = required;
        self
    }

    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_risk_level(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }
}

/// Per-call execution context handed to an operation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    call_id: String,
    working_directory: PathBuf,
    cancellation: CancellationToken,
    span: Span,
}

impl OperationContext {
    pub fn new(
        call_id: impl Into<String>,
        working_directory: impl Into<PathBuf>,
        cancellation: CancellationToken,
        span: Span,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            working_directory: working_directory.into(),
            cancellation,
            span,
        }
    }

    /// Id of the call being executed.
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Directory relative paths should be resolved against.
    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// Cancellation signal for the whole batch.
    ///
    /// Long-running operations should poll it and return
    /// `OperationError::Cancelled` when it fires.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The `tool_call` span the call runs in; use it as the logger handle.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

/// Type-erased operation: JSON parameters in, JSON payload out.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Metadata for this operation.
    fn spec(&self) -> &OperationSpec;

    /// Executes the operation.
    async fn execute(
        &self,
        parameters: JsonValue,
        context: &OperationContext,
    ) -> Result<JsonValue, OperationError>;
}

type OperationFn = Box<
    dyn Fn(JsonValue, OperationContext) -> BoxFuture<'static, Result<JsonValue, OperationError>>
        + Send
        + Sync,
>;

/// An operation backed by an async closure.
pub struct FnOperation {
    spec: OperationSpec,
    handler: OperationFn,
}

impl FnOperation {
    pub fn new<F, Fut>(spec: OperationSpec, handler: F) -> Self
    where
        F: Fn(JsonValue, OperationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonValue, OperationError>> + Send + 'static,
    {
        Self {
            spec,
            handler: Box::new(move |params, ctx| Box::pin(handler(params, ctx))),
        }
    }
}

impl std::fmt::Debug for FnOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnOperation")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Operation for FnOperation {
    fn spec(&self) -> &OperationSpec {
        &self.spec
    }

    async fn execute(
        &self,
        parameters: JsonValue,
        context: &OperationContext,
    ) -> Result<JsonValue, OperationError> {
        (self.handler)(parameters, context.clone()).await
    }
}

/// A strongly typed operation.
///
/// Wrap implementations in [`ToolAdapter`] to register them.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Parameter type decoded from the call's parameter bag.
    type Params: DeserializeOwned + Send;

    /// Output type encoded into the result payload.
    type Output: Serialize + Send;

    /// Metadata for this tool. Called once, when the adapter is created.
    fn spec(&self) -> OperationSpec;

    /// Runs the tool with decoded parameters.
    async fn run(
        &self,
        params: Self::Params,
        context: &OperationContext,
    ) -> Result<Self::Output, OperationError>;
}

/// Adapter that exposes a [`Tool`] as a type-erased [`Operation`].
pub struct ToolAdapter<T: Tool> {
    inner: T,
    spec: OperationSpec,
}

impl<T: Tool> ToolAdapter<T> {
    pub fn new(tool: T) -> Self {
        let spec = tool.spec();
        Self { inner: tool, spec }
    }

    /// Returns a reference to the wrapped tool.
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: Tool> Operation for ToolAdapter<T> {
    fn spec(&self) -> &OperationSpec {
        &self.spec
    }

    async fn execute(
        &self,
        parameters: JsonValue,
        context: &OperationContext,
    ) -> Result<JsonValue, OperationError> {
        let params: T::Params = serde_json::from_value(parameters)
            .map_err(|e| OperationError::InvalidParameters(e.to_string()))?;
        let output = self.inner.run(params, context).await?;
        Ok(serde_json::to_value(output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_context() -> OperationContext {
        OperationContext::new(
            "call_1",
            "/tmp",
            CancellationToken::new(),
            Span::none(),
        )
    }

    #[derive(Deserialize)]
    #[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
    struct ReadParams {
        path: String,
    }

    #[derive(Serialize)]
    struct ReadOutput {
        content: String,
    }

    struct ReadFileTool;

    #[async_trait]
    impl Tool for ReadFileTool {
        type Params = ReadParams;
        type Output = ReadOutput;

        fn spec(&self) -> OperationSpec {
            OperationSpec::new("read_file", "Read a file")
                .with_parameters_schema(json!({"type": "object"}))
                .cacheable(true)
        }

        async fn run(
            &self,
            params: ReadParams,
            _context: &OperationContext,
        ) -> Result<ReadOutput, OperationError> {
            Ok(ReadOutput {
                content: format!("contents of {}", params.path),
            })
        }
    }

    #[test]
    fn test_spec_builder() {
        let spec = OperationSpec::new("write_file", "Write a file")
            .depends_on("read_file")
            .requires_approval(true)
            .retryable(true)
            .with_timeout(Duration::from_secs(5))
            .with_risk_level(RiskLevel::High);

        assert_eq!(spec.name, "write_file");
        assert_eq!(spec.dependencies, vec!["read_file".to_string()]);
        assert!(spec.requires_approval);
        assert!(spec.retryable);
        assert!(!spec.cacheable);
        assert_eq!(spec.timeout, Some(Duration::from_secs(5)));
        assert_eq!(spec.risk_level, RiskLevel::High);
        assert!(spec.parameters_schema.is_null());
    }

    #[cfg(feature = "schema")]
    #[test]
    fn test_schema_for_derives_object_schema() {
        let spec = OperationSpec::new("read_file", "Read a file").with_schema_for::<ReadParams>();
        assert_eq!(spec.parameters_schema["type"], "object");
        assert!(spec.parameters_schema["properties"]["path"].is_object());
    }

    #[tokio::test]
    async fn test_fn_operation_receives_context() {
        let op = FnOperation::new(
            OperationSpec::new("echo", "Echo").with_parameters_schema(json!({})),
            |params, ctx| async move { Ok(json!({"call": ctx.call_id(), "params": params})) },
        );

        let output = op.execute(json!({"a": 1}), &test_context()).await.unwrap();
        assert_eq!(output, json!({"call": "call_1", "params": {"a": 1}}));
    }

    #[tokio::test]
    async fn test_tool_adapter_round_trip() {
        let op = ToolAdapter::new(ReadFileTool);
        assert_eq!(op.spec().name, "read_file");

        let output = op
            .execute(json!({"path": "Cargo.toml"}), &test_context())
            .await
            .unwrap();
        assert_eq!(output, json!({"content": "contents of Cargo.toml"}));
    }

    #[tokio::test]
    async fn test_tool_adapter_rejects_bad_params() {
        let op = ToolAdapter::new(ReadFileTool);
        let err = op
            .execute(json!({"wrong": true}), &test_context())
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidParameters(_)));
    }

    #[test]
    fn test_risk_level_serde() {
        assert_eq!(serde_json::to_value(RiskLevel::Critical).unwrap(), json!("critical"));
        assert_eq!(RiskLevel::default(), RiskLevel::Low);
    }
}
