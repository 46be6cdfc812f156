//! Catalog of operations available to the orchestrator.
//!
//! The registry is an explicit instance owned by the caller and handed to the
//! [`Orchestrator`](crate::orchestrator::Orchestrator); there is no process-wide
//! registry.

use crate::operation::{Operation, OperationSpec};
use crate::orchestrator::OrchestratorError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// What the reasoning layer needs to know about an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub name: String,
    pub description: String,
    pub parameters_schema: JsonValue,
}

impl From<&OperationSpec> for OperationSummary {
    fn from(spec: &OperationSpec) -> Self {
        Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters_schema: spec.parameters_schema.clone(),
        }
    }
}

/// Registry of operations keyed by name.
///
/// # Examples
///
/// ```ignore
/// let mut registry = OperationRegistry::new();
/// registry.register(read_file)?;
/// registry.register(write_file)?;
/// registry.validate_all()?; // every declared dependency must be registered
/// ```
#[derive(Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
    /// Registration order, used for deterministic listing.
    order: Vec<String>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an operation.
    ///
    /// Fails with `InvalidOperation` when the name, description or parameter
    /// schema is missing, and with `DuplicateOperation` when the name is taken.
    pub fn register(&mut self, operation: impl Operation + 'static) -> Result<(), OrchestratorError> {
        self.register_arc(Arc::new(operation))
    }

    /// Registers an already shared operation.
    pub fn register_arc(&mut self, operation: Arc<dyn Operation>) -> Result<(), OrchestratorError> {
        let spec = operation.spec();
        Self::check_spec(spec)?;

        if self.operations.contains_key(&spec.name) {
            return Err(OrchestratorError::DuplicateOperation(spec.name.clone()));
        }

        debug!(operation = %spec.name, "Operation registered");
        let name = spec.name.clone();
        self.order.push(name.clone());
        self.operations.insert(name, operation);
        Ok(())
    }

    fn check_spec(spec: &OperationSpec) -> Result<(), OrchestratorError> {
        if spec.name.trim().is_empty() {
            return Err(OrchestratorError::invalid_operation(
                &spec.name,
                "name is empty",
            ));
        }
        if spec.description.trim().is_empty() {
            return Err(OrchestratorError::invalid_operation(
                &spec.name,
                "description is empty",
            ));
        }
        if !spec.parameters_schema.is_object() {
            return Err(OrchestratorError::invalid_operation(
                &spec.name,
                "parameter schema is missing or not a JSON object",
            ));
        }
        Ok(())
    }

    /// Checks that every declared dependency names a registered operation.
    ///
    /// Call once after bulk registration. Operations are checked in
    /// registration order, so the reported error is deterministic.
    pub fn validate_all(&self) -> Result<(), OrchestratorError> {
        for name in &self.order {
            let Some(operation) = self.operations.get(name) else {
                continue;
            };
            for dependency in &operation.spec().dependencies {
                if !self.operations.contains_key(dependency) {
                    return Err(OrchestratorError::MissingDependency {
                        operation: name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Looks up an operation by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Operation>, OrchestratorError> {
        self.operations
            .get(name)
            .cloned()
            .ok_or_else(|| OrchestratorError::OperationNotFound(name.to_string()))
    }

    /// Looks up an operation's spec by name.
    pub fn spec(&self, name: &str) -> Option<&OperationSpec> {
        self.operations.get(name).map(|op| op.spec())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Summaries of all operations, in registration order.
    pub fn list(&self) -> Vec<OperationSummary> {
        self.order
            .iter()
            .filter_map(|name| self.operations.get(name))
            .map(|op| OperationSummary::from(op.spec()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::FnOperation;
    use serde_json::json;

    fn op(spec: OperationSpec) -> FnOperation {
        FnOperation::new(spec, |_, _| async { Ok(json!(null)) })
    }

    fn spec(name: &str) -> OperationSpec {
        OperationSpec::new(name, format!("{} operation", name))
            .with_parameters_schema(json!({"type": "object"}))
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = OperationRegistry::new();
        registry.register(op(spec("read_file"))).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("read_file"));
        assert_eq!(registry.get("read_file").unwrap().spec().name, "read_file");
    }

    #[test]
    fn test_register_duplicate_fails() {
        let mut registry = OperationRegistry::new();
        registry.register(op(spec("read_file"))).unwrap();

        let err = registry.register(op(spec("read_file"))).unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::DuplicateOperation("read_file".to_string())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_rejects_missing_description() {
        let mut registry = OperationRegistry::new();
        let bad = OperationSpec::new("read_file", "  ").with_parameters_schema(json!({}));

        let err = registry.register(op(bad)).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidOperation { .. }));
    }

    #[test]
    fn test_register_rejects_missing_schema() {
        let mut registry = OperationRegistry::new();
        let bad = OperationSpec::new("read_file", "Read a file");

        let err = registry.register(op(bad)).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidOperation { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_rejects_empty_name() {
        let mut registry = OperationRegistry::new();
        let err = registry.register(op(spec(""))).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidOperation { .. }));
    }

    #[test]
    fn test_validate_all_reports_missing_dependency() {
        let mut registry = OperationRegistry::new();
        registry
            .register(op(spec("write_file").depends_on("read_file")))
            .unwrap();

        let err = registry.validate_all().unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::MissingDependency {
                operation: "write_file".to_string(),
                dependency: "read_file".to_string(),
            }
        );

        registry.register(op(spec("read_file"))).unwrap();
        assert!(registry.validate_all().is_ok());
    }

    #[test]
    fn test_get_unknown_operation() {
        let registry = OperationRegistry::new();
        let err = registry.get("nope").err().unwrap();
        assert_eq!(err, OrchestratorError::OperationNotFound("nope".to_string()));
    }

    #[test]
    fn test_list_preserves_registration_order() {
        let mut registry = OperationRegistry::new();
        registry.register(op(spec("search_code"))).unwrap();
        registry.register(op(spec("list_files"))).unwrap();

        let names: Vec<_> = registry.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["search_code", "list_files"]);
    }
}
