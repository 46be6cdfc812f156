//! Dependency analysis for the parallel executor.
//!
//! Builds the call graph of a batch from three edge sources:
//! explicit `depends_on` ids, dependencies declared by the called operation,
//! and parameter references to other calls.

use super::references::collect_references;
use super::{DependencyGraph, ExecutionPlan};
use crate::orchestrator::{OrchestratorError, ToolCall};
use crate::registry::OperationRegistry;
use std::collections::HashMap;
use tracing::debug;

/// Builds the dependency graph for a batch of calls.
///
/// Validation is all-or-nothing: duplicate ids, unknown operations, unknown
/// `depends_on` targets and malformed references fail the whole batch before
/// anything runs.
///
/// An operation-declared dependency is wired to the *first* call in the batch
/// that invokes the named operation; later invocations need an explicit
/// `depends_on`. Declared dependencies with no matching call in the batch add
/// no edge.
pub fn build_dependency_graph(
    calls: &[ToolCall],
    registry: &OperationRegistry,
) -> Result<DependencyGraph, OrchestratorError> {
    let mut graph = DependencyGraph::new();

    // operation name -> index of the first call invoking it
    let mut first_call_for: HashMap<&str, usize> = HashMap::new();
    for call in calls {
        if graph.index_of(&call.id).is_some() {
            return Err(OrchestratorError::DuplicateCallId(call.id.clone()));
        }
        if !registry.contains(&call.operation_name) {
            return Err(OrchestratorError::OperationNotFound(
                call.operation_name.clone(),
            ));
        }
        let idx = graph.add_node(&call.id);
        first_call_for.entry(call.operation_name.as_str()).or_insert(idx);
    }

    for (idx, call) in calls.iter().enumerate() {
        for dep in &call.depends_on {
            let dep_idx =
                graph
                    .index_of(dep)
                    .ok_or_else(|| OrchestratorError::UnknownCallDependency {
                        call_id: call.id.clone(),
                        depends_on: dep.clone(),
                    })?;
            graph.add_edge(idx, dep_idx);
        }

        if let Some(spec) = registry.spec(&call.operation_name) {
            for dep_operation in &spec.dependencies {
                match first_call_for.get(dep_operation.as_str()) {
                    Some(&dep_idx) if dep_idx != idx => {
                        debug!(
                            call_id = %call.id,
                            operation = %call.operation_name,
                            dependency = %dep_operation,
                            "Wiring operation-declared dependency"
                        );
                        graph.add_edge(idx, dep_idx);
                    }
                    _ => {}
                }
            }
        }

        let references = collect_references(&call.parameters).map_err(|e| {
            OrchestratorError::InvalidReference {
                call_id: call.id.clone(),
                reason: e.to_string(),
            }
        })?;
        for reference in references {
            let dep_idx = graph.index_of(&reference.call_id).ok_or_else(|| {
                OrchestratorError::InvalidReference {
                    call_id: call.id.clone(),
                    reason: format!("'{}' is not a call in this batch", reference.call_id),
                }
            })?;
            graph.add_edge(idx, dep_idx);
        }
    }

    Ok(graph)
}

/// Builds the graph and derives the execution plan, rejecting cycles.
pub fn plan_calls(
    calls: &[ToolCall],
    registry: &OperationRegistry,
) -> Result<ExecutionPlan, OrchestratorError> {
    let graph = build_dependency_graph(calls, registry)?;
    graph.plan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{FnOperation, OperationSpec};
    use serde_json::json;

    fn registry() -> OperationRegistry {
        let mut registry = OperationRegistry::new();
        for (name, deps) in [
            ("list_files", vec![]),
            ("search_code", vec![]),
            ("read_file", vec![]),
            ("write_file", vec!["read_file"]),
        ] {
            let mut spec = OperationSpec::new(name, format!("{} operation", name))
                .with_parameters_schema(json!({"type": "object"}));
            for dep in deps {
                spec = spec.depends_on(dep);
            }
            registry
                .register(FnOperation::new(spec, |_, _| async { Ok(json!(null)) }))
                .unwrap();
        }
        registry
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_explicit_dependencies() {
        let calls = vec![
            ToolCall::new("1", "list_files"),
            ToolCall::new("2", "search_code"),
            ToolCall::new("3", "read_file").depends_on(["1"]),
            ToolCall::new("4", "read_file").depends_on(["1"]),
            ToolCall::new("5", "list_files").depends_on(["2", "3", "4"]),
        ];
        let plan = plan_calls(&calls, &registry()).unwrap();
        assert_eq!(
            plan.levels,
            vec![ids(&["1", "2"]), ids(&["3", "4"]), ids(&["5"])]
        );
    }

    #[test]
    fn test_operation_dependency_wires_first_matching_call_only() {
        let calls = vec![
            ToolCall::new("r1", "read_file"),
            ToolCall::new("r2", "read_file"),
            ToolCall::new("w", "write_file"),
        ];
        let graph = build_dependency_graph(&calls, &registry()).unwrap();
        assert_eq!(graph.get_dependencies("w"), ids(&["r1"]));
    }

    #[test]
    fn test_operation_dependency_without_matching_call_adds_no_edge() {
        let calls = vec![ToolCall::new("w", "write_file")];
        let graph = build_dependency_graph(&calls, &registry()).unwrap();
        assert!(graph.get_dependencies("w").is_empty());
    }

    #[test]
    fn test_references_add_edges() {
        let calls = vec![
            ToolCall::new("1", "list_files"),
            ToolCall::new("2", "read_file")
                .with_parameters(json!({"path": {"$call.ref": "1", "path": "files[0]"}})),
        ];
        let graph = build_dependency_graph(&calls, &registry()).unwrap();
        assert_eq!(graph.get_dependencies("2"), ids(&["1"]));
    }

    #[test]
    fn test_literal_data_adds_no_edges() {
        let calls = vec![
            ToolCall::new("1", "list_files"),
            ToolCall::new("2", "search_code").with_parameters(json!({
                "query": "{{ 1 }}",
                "schema": {"$ref": "#/definitions/Foo"},
                "escaped": {"$call.literal": {"$call.ref": "1"}}
            })),
        ];
        let graph = build_dependency_graph(&calls, &registry()).unwrap();
        assert!(graph.get_dependencies("2").is_empty());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_duplicate_call_id() {
        let calls = vec![
            ToolCall::new("1", "list_files"),
            ToolCall::new("1", "search_code"),
        ];
        assert_eq!(
            build_dependency_graph(&calls, &registry()).unwrap_err(),
            OrchestratorError::DuplicateCallId("1".into())
        );
    }

    #[test]
    fn test_unknown_operation() {
        let calls = vec![ToolCall::new("1", "deploy")];
        assert_eq!(
            build_dependency_graph(&calls, &registry()).unwrap_err(),
            OrchestratorError::OperationNotFound("deploy".into())
        );
    }

    #[test]
    fn test_unknown_depends_on() {
        let calls = vec![ToolCall::new("1", "list_files").depends_on(["7"])];
        assert_eq!(
            build_dependency_graph(&calls, &registry()).unwrap_err(),
            OrchestratorError::UnknownCallDependency {
                call_id: "1".into(),
                depends_on: "7".into()
            }
        );
    }

    #[test]
    fn test_reference_to_unknown_call_is_invalid() {
        let calls = vec![ToolCall::new("1", "read_file").with_parameters(json!({"$call.ref": "9"}))];
        assert!(matches!(
            build_dependency_graph(&calls, &registry()),
            Err(OrchestratorError::InvalidReference { .. })
        ));
    }

    #[test]
    fn test_cycles_are_rejected_at_planning() {
        let calls = vec![
            ToolCall::new("a", "list_files").depends_on(["b"]),
            ToolCall::new("b", "list_files").depends_on(["a"]),
        ];
        let err = plan_calls(&calls, &registry()).unwrap_err();
        assert_eq!(err.cycle().unwrap(), ids(&["a", "b", "a"]).as_slice());
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let calls = vec![ToolCall::new("a", "read_file").with_parameters(json!({"$call.ref": "a"}))];
        assert!(matches!(
            plan_calls(&calls, &registry()),
            Err(OrchestratorError::CircularDependency { .. })
        ));
    }
}
