//! Tool call submission shape.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One requested invocation of an operation.
///
/// Calls are produced by the reasoning layer, consumed once by the executor
/// and never mutated after submission. The serialized form matches the
/// submission shape `{id, operationName, parameters, dependsOn}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Unique within a batch.
    pub id: String,
    pub operation_name: String,
    #[serde(default = "empty_parameters")]
    pub parameters: JsonValue,
    /// Ids of calls in the same batch that must complete first.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn empty_parameters() -> JsonValue {
    JsonValue::Object(Default::default())
}

impl ToolCall {
    pub fn new(id: impl Into<String>, operation_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            operation_name: operation_name.into(),
            parameters: empty_parameters(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: JsonValue) -> Self {
        self.parameters = parameters;
        self
    }

    /// Adds explicit dependencies on other calls.
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_submission_shape() {
        let call: ToolCall = serde_json::from_value(json!({
            "id": "3",
            "operationName": "read_file",
            "parameters": {"path": "src/lib.rs"},
            "dependsOn": ["1"]
        }))
        .unwrap();

        assert_eq!(call.id, "3");
        assert_eq!(call.operation_name, "read_file");
        assert_eq!(call.depends_on, vec!["1".to_string()]);
    }

    #[test]
    fn test_deserialize_defaults() {
        let call: ToolCall =
            serde_json::from_value(json!({"id": "1", "operationName": "list_files"})).unwrap();
        assert_eq!(call.parameters, json!({}));
        assert!(call.depends_on.is_empty());
    }

    #[test]
    fn test_builder() {
        let call = ToolCall::new("5", "write_file")
            .with_parameters(json!({"path": "out"}))
            .depends_on(["2", "3"])
            .depends_on(vec![String::from("4")]);
        assert_eq!(call.depends_on, vec!["2", "3", "4"]);
    }
}
