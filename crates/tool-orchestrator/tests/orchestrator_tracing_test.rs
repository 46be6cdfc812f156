//! Tracing tests for the Orchestrator
//!
//! These tests verify that structured spans and events are emitted while a
//! batch executes.

use serde_json::json;
use std::sync::Arc;
use tool_orchestrator::operation::{FnOperation, OperationError, OperationSpec};
use tool_orchestrator::orchestrator::{ExecuteOptions, Orchestrator, ToolCall};
use tool_orchestrator::registry::OperationRegistry;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::FmtSpan;

// ============================================================================
// Test Infrastructure
// ============================================================================

/// Captures tracing output to a string for verification
#[derive(Clone)]
struct TestWriter {
    output: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl TestWriter {
    fn new() -> Self {
        Self {
            output: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    fn get_output(&self) -> String {
        let bytes = self.output.lock().unwrap();
        String::from_utf8_lossy(&bytes).to_string()
    }
}

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.output.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.output.lock().unwrap().flush()
    }
}

impl<'a> MakeWriter<'a> for TestWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn install(writer: &TestWriter) -> tracing::subscriber::DefaultGuard {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_ansi(false)
        .with_writer(writer.clone())
        .finish();

    tracing::subscriber::set_default(subscriber)
}

fn registry() -> OperationRegistry {
    let mut registry = OperationRegistry::new();
    for name in ["list_files", "read_file"] {
        registry
            .register(FnOperation::new(
                OperationSpec::new(name, "Test operation")
                    .with_parameters_schema(json!({"type": "object"})),
                |params, ctx| async move {
                    tracing::info!("operation body running");
                    Ok(json!({"call": ctx.call_id(), "params": params}))
                },
            ))
            .unwrap();
    }
    registry
        .register(FnOperation::new(
            OperationSpec::new("broken", "Always fails")
                .with_parameters_schema(json!({"type": "object"})),
            |_, _| async { Err(OperationError::failed("disk exploded")) },
        ))
        .unwrap();
    registry
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_top_level_span_created() {
    let writer = TestWriter::new();
    let _guard = install(&writer);

    let orchestrator = Orchestrator::new(registry()).unwrap();
    orchestrator
        .execute(
            &[ToolCall::new("1", "list_files")],
            ExecuteOptions::default().with_fail_fast(true),
        )
        .await
        .unwrap();

    let output = writer.get_output();
    assert!(
        output.contains("orchestrator_execute"),
        "Top-level span 'orchestrator_execute' not found in output:\n{}",
        output
    );
    assert!(
        output.contains("total_calls=1") && output.contains("fail_fast=true"),
        "Span should include its attributes in output:\n{}",
        output
    );
}

#[tokio::test]
async fn test_level_spans_created() {
    let writer = TestWriter::new();
    let _guard = install(&writer);

    let orchestrator = Orchestrator::new(registry()).unwrap();
    let calls = vec![
        ToolCall::new("1", "list_files"),
        ToolCall::new("2", "list_files").with_parameters(json!({"dir": "tests"})),
        ToolCall::new("3", "read_file").depends_on(["1"]),
    ];
    orchestrator
        .execute(&calls, ExecuteOptions::default())
        .await
        .unwrap();

    let output = writer.get_output();
    assert!(
        output.contains("graph_level"),
        "Level spans not found in output:\n{}",
        output
    );
    assert!(
        output.contains("level=0") && output.contains("calls=2"),
        "Level 0 with two calls not found in output:\n{}",
        output
    );
    assert!(
        output.contains("level=1") && output.contains("calls=1"),
        "Level 1 with one call not found in output:\n{}",
        output
    );
}

#[tokio::test]
async fn test_call_spans_wrap_operation_events() {
    let writer = TestWriter::new();
    let _guard = install(&writer);

    let orchestrator = Orchestrator::new(registry()).unwrap();
    orchestrator
        .execute(
            &[ToolCall::new("read-1", "read_file")],
            ExecuteOptions::default(),
        )
        .await
        .unwrap();

    let output = writer.get_output();
    assert!(
        output.contains("tool_call"),
        "Call span not found in output:\n{}",
        output
    );
    assert!(
        output.contains("call_id=read-1") && output.contains("operation=read_file"),
        "Call span should include call_id and operation:\n{}",
        output
    );

    let body_line = output
        .lines()
        .find(|line| line.contains("operation body running"))
        .unwrap_or_else(|| panic!("Operation event not found in output:\n{}", output));
    assert!(
        body_line.contains("tool_call"),
        "Operation events should be recorded inside the call span:\n{}",
        body_line
    );
}

#[tokio::test]
async fn test_failure_is_logged_at_warn() {
    let writer = TestWriter::new();
    let _guard = install(&writer);

    let orchestrator = Orchestrator::new(registry()).unwrap();
    orchestrator
        .execute(&[ToolCall::new("1", "broken")], ExecuteOptions::default())
        .await
        .unwrap();

    let output = writer.get_output();
    let failure = output
        .lines()
        .find(|line| line.contains("Call failed"))
        .unwrap_or_else(|| panic!("Failure event not found in output:\n{}", output));
    assert!(failure.contains("WARN"), "Expected WARN level:\n{}", failure);
    assert!(
        failure.contains("disk exploded"),
        "Failure event should carry the error:\n{}",
        failure
    );
}

#[tokio::test]
async fn test_execution_summary_logged() {
    let writer = TestWriter::new();
    let _guard = install(&writer);

    let orchestrator = Orchestrator::new(registry()).unwrap();
    orchestrator
        .execute(&[ToolCall::new("1", "list_files")], ExecuteOptions::default())
        .await
        .unwrap();

    let output = writer.get_output();
    assert!(
        output.contains("Execution finished") && output.contains("successful=1"),
        "Execution summary not found in output:\n{}",
        output
    );
}
