//! Example: running a small batch of dependent tool calls.
//!
//! Registers three operations over an in-memory "file system", then executes a
//! batch where the third call reads a path produced by the first.
//!
//! Run with: cargo run --example orchestrator_basic

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tool_orchestrator::approval::{ApprovalRequest, ApprovalResponse};
use tool_orchestrator::observability::{self, ObservabilityConfig};
use tool_orchestrator::operation::{
    FnOperation, OperationContext, OperationError, OperationSpec, RiskLevel, Tool, ToolAdapter,
};
use tool_orchestrator::orchestrator::{Orchestrator, OrchestratorConfig, ToolCall};
use tool_orchestrator::registry::OperationRegistry;

type Files = Arc<BTreeMap<String, String>>;

#[derive(Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
struct ReadParams {
    path: String,
}

#[derive(Serialize)]
struct ReadOutput {
    path: String,
    content: String,
}

struct ReadFile {
    files: Files,
}

#[async_trait]
impl Tool for ReadFile {
    type Params = ReadParams;
    type Output = ReadOutput;

    fn spec(&self) -> OperationSpec {
        let spec = OperationSpec::new("read_file", "Read a file from the workspace")
            .depends_on("list_files")
            .cacheable(true);
        #[cfg(feature = "schema")]
        let spec = spec.with_schema_for::<ReadParams>();
        #[cfg(not(feature = "schema"))]
        let spec = spec.with_parameters_schema(json!({"type": "object"}));
        spec
    }

    async fn run(
        &self,
        params: ReadParams,
        _context: &OperationContext,
    ) -> Result<ReadOutput, OperationError> {
        let content = self
            .files
            .get(&params.path)
            .cloned()
            .ok_or_else(|| OperationError::NotFound(params.path.clone()))?;
        Ok(ReadOutput {
            path: params.path,
            content,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init(ObservabilityConfig::default())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let files: Files = Arc::new(BTreeMap::from([
        ("README.md".to_string(), "# demo".to_string()),
        ("src/main.rs".to_string(), "fn main() {}".to_string()),
    ]));

    let mut registry = OperationRegistry::new();
    let listing = files.clone();
    registry.register(FnOperation::new(
        OperationSpec::new("list_files", "List files in the workspace")
            .with_parameters_schema(json!({"type": "object"}))
            .cacheable(true)
            .retryable(true),
        move |_, _| {
            let listing = listing.clone();
            async move { Ok(json!({"files": listing.keys().collect::<Vec<_>>()})) }
        },
    ))?;
    registry.register(ToolAdapter::new(ReadFile {
        files: files.clone(),
    }))?;
    registry.register(FnOperation::new(
        OperationSpec::new("write_file", "Write a file to the workspace")
            .with_parameters_schema(json!({"type": "object"}))
            .requires_approval(true)
            .with_risk_level(RiskLevel::High),
        |params, _| async move { Ok(json!({"written": params["path"]})) },
    ))?;

    let config = OrchestratorConfig::new()
        .with_max_concurrency(4)
        .with_default_timeout(Duration::from_secs(30));
    let orchestrator = Orchestrator::with_config(registry, config)?;

    let calls = vec![
        ToolCall::new("1", "list_files"),
        ToolCall::new("2", "read_file").with_parameters(json!({"path": "README.md"})),
        ToolCall::new("3", "read_file")
            .with_parameters(json!({"path": {"$call.ref": "1", "path": "files[1]"}})),
        ToolCall::new("4", "write_file")
            .with_parameters(json!({"path": "NOTES.md", "content": "hello"}))
            .depends_on(["3"]),
    ];

    let plan = orchestrator.plan(&calls)?;
    println!("Plan: {} level(s)", plan.level_count());
    for (index, level) in plan.levels.iter().enumerate() {
        println!("  level {}: {}", index, level.join(", "));
    }

    let options = orchestrator
        .execute_options()
        .with_approval_callback(|request: &ApprovalRequest| {
            println!(
                "Approving {} ({} risk) with {}",
                request.operation_name, request.risk_level, request.parameters
            );
            ApprovalResponse::approve()
        });

    let report = orchestrator.execute(&calls, options).await?;
    println!("\n{}", report);

    // Same batch again: cacheable calls are served from the cache
    let report = orchestrator
        .execute(&calls[..3], orchestrator.execute_options())
        .await?;
    println!("{}", report);
    println!("Cache: {:?}", orchestrator.cache_stats());

    Ok(())
}
