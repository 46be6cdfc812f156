//! Typed references from one call's parameters to another call's result.
//!
//! Parameters are opaque data: strings are never inspected, and ordinary
//! objects (including ones carrying keys such as `$ref`) pass through
//! untouched. Only objects keyed by one of two reserved markers are
//! interpreted:
//!
//! - `{"$call.ref": "3", "path": "files[0].name"}` is replaced by the selected
//!   part of call `3`'s payload (`path` optional, whole payload otherwise).
//! - `{"$call.literal": <value>}` is replaced by `<value>` exactly as written,
//!   without looking inside it. This is the escape for data that itself
//!   contains a marker key.
//!
//! Build both with [`call_ref`] and [`literal`] rather than by hand.

use crate::orchestrator::result::CallResult;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use thiserror::Error;

/// Marker key of a reference object.
pub const REF_KEY: &str = "$call.ref";
/// Marker key of a literal object.
pub const LITERAL_KEY: &str = "$call.literal";
const PATH_KEY: &str = "path";

/// Errors raised while parsing or resolving references.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("Malformed reference: {0}")]
    InvalidSyntax(String),

    #[error("Invalid field path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Referenced call '{call_id}' has no result")]
    MissingResult { call_id: String },

    #[error("Referenced call '{call_id}' failed")]
    FailedDependency { call_id: String },

    #[error("Result of call '{call_id}' has no field '{path}'")]
    MissingField { call_id: String, path: String },
}

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A path into a JSON value, e.g. `files[0].name`. The empty path selects
/// the whole value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(path: &str) -> Result<Self, ReferenceError> {
        let trimmed = path.trim();
        let invalid = |reason: &str| ReferenceError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        if trimmed.is_empty() {
            return Ok(Self { segments });
        }

        for (i, part) in trimmed.split('.').enumerate() {
            let (key, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            // Only the first part may start directly with an index: "[0].name"
            if key.is_empty() && (i > 0 || rest.is_empty()) {
                return Err(invalid("empty segment"));
            }
            if key.contains(']') || key.chars().any(char::is_whitespace) {
                return Err(invalid("unexpected character in key"));
            }
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            }

            while !rest.is_empty() {
                let (index, tail) = rest
                    .strip_prefix('[')
                    .and_then(|r| r.split_once(']'))
                    .ok_or_else(|| invalid("unterminated index"))?;
                let index = index
                    .parse::<usize>()
                    .map_err(|_| invalid("index must be a non-negative integer"))?;
                segments.push(PathSegment::Index(index));
                rest = tail;
            }
        }

        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Walks the path; `None` if any step is missing.
    pub fn select<'a>(&self, value: &'a JsonValue) -> Option<&'a JsonValue> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| match segment {
                PathSegment::Key(key) => current.get(key.as_str()),
                PathSegment::Index(index) => current.get(*index),
            })
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => write!(f, "{}", key)?,
                PathSegment::Key(key) => write!(f, ".{}", key)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// A reference to the result of another call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamRef {
    pub call_id: String,
    pub path: FieldPath,
}

/// How the reference pass treats one parameter node.
enum Node<'a> {
    Reference(ParamRef),
    Literal(&'a JsonValue),
    Data,
}

impl<'a> Node<'a> {
    fn classify(value: &'a JsonValue) -> Result<Self, ReferenceError> {
        let JsonValue::Object(map) = value else {
            return Ok(Node::Data);
        };

        if let Some(inner) = map.get(LITERAL_KEY) {
            if map.len() != 1 {
                return Err(ReferenceError::InvalidSyntax(format!(
                    "'{}' must be the only key of its object",
                    LITERAL_KEY
                )));
            }
            return Ok(Node::Literal(inner));
        }

        if !map.contains_key(REF_KEY) {
            return Ok(Node::Data);
        }
        if let Some(extra) = map.keys().find(|k| *k != REF_KEY && *k != PATH_KEY) {
            return Err(ReferenceError::InvalidSyntax(format!(
                "unexpected key '{}' in reference object",
                extra
            )));
        }
        let call_id = map
            .get(REF_KEY)
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ReferenceError::InvalidSyntax(format!("'{}' must be a non-empty string", REF_KEY))
            })?;
        let path = match map.get(PATH_KEY) {
            None | Some(JsonValue::Null) => FieldPath::root(),
            Some(JsonValue::String(path)) => FieldPath::parse(path)?,
            Some(_) => {
                return Err(ReferenceError::InvalidSyntax("'path' must be a string".into()));
            }
        };
        Ok(Node::Reference(ParamRef {
            call_id: call_id.to_string(),
            path,
        }))
    }
}

impl ParamRef {
    pub fn new(call_id: impl Into<String>, path: FieldPath) -> Self {
        Self {
            call_id: call_id.into(),
            path,
        }
    }

    /// Recognizes a reference object.
    ///
    /// Returns `Ok(None)` for plain data and for literal objects, and an
    /// error for marker objects that are malformed.
    pub fn from_value(value: &JsonValue) -> Result<Option<Self>, ReferenceError> {
        match Node::classify(value)? {
            Node::Reference(reference) => Ok(Some(reference)),
            Node::Literal(_) | Node::Data => Ok(None),
        }
    }

    /// The marker object for this reference.
    pub fn to_value(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        map.insert(REF_KEY.to_string(), JsonValue::String(self.call_id.clone()));
        if !self.path.is_root() {
            map.insert(PATH_KEY.to_string(), JsonValue::String(self.path.to_string()));
        }
        JsonValue::Object(map)
    }

    /// Looks up the referenced value in the accumulated results.
    pub fn resolve<'a>(
        &self,
        results: &'a HashMap<String, CallResult>,
    ) -> Result<&'a JsonValue, ReferenceError> {
        let result = results
            .get(&self.call_id)
            .ok_or_else(|| ReferenceError::MissingResult {
                call_id: self.call_id.clone(),
            })?;
        if !result.success {
            return Err(ReferenceError::FailedDependency {
                call_id: self.call_id.clone(),
            });
        }
        result
            .payload
            .as_ref()
            .and_then(|payload| self.path.select(payload))
            .ok_or_else(|| ReferenceError::MissingField {
                call_id: self.call_id.clone(),
                path: self.path.to_string(),
            })
    }
}

/// Builds a reference to `path` within the payload of call `call_id`.
///
/// `path` uses the [`FieldPath`] syntax; an empty string selects the whole
/// payload.
pub fn call_ref(call_id: &str, path: &str) -> Result<JsonValue, ReferenceError> {
    Ok(ParamRef::new(call_id, FieldPath::parse(path)?).to_value())
}

/// Wraps a value so the reference pass hands it to the operation unchanged.
pub fn literal(value: JsonValue) -> JsonValue {
    let mut map = serde_json::Map::new();
    map.insert(LITERAL_KEY.to_string(), value);
    JsonValue::Object(map)
}

/// Collects every reference in a parameter tree, in document order.
///
/// Literal objects are not descended into.
pub fn collect_references(params: &JsonValue) -> Result<Vec<ParamRef>, ReferenceError> {
    let mut found = Vec::new();
    let mut stack = vec![params];
    while let Some(value) = stack.pop() {
        match Node::classify(value)? {
            Node::Reference(reference) => found.push(reference),
            Node::Literal(_) => {}
            Node::Data => match value {
                JsonValue::Array(items) => stack.extend(items.iter().rev()),
                JsonValue::Object(map) => {
                    let values: Vec<&JsonValue> = map.values().collect();
                    stack.extend(values.into_iter().rev());
                }
                _ => {}
            },
        }
    }
    Ok(found)
}

/// Returns a copy of `params` with every reference replaced by its value and
/// every literal unwrapped.
pub fn resolve_parameters(
    params: &JsonValue,
    results: &HashMap<String, CallResult>,
) -> Result<JsonValue, ReferenceError> {
    match Node::classify(params)? {
        Node::Reference(reference) => reference.resolve(results).cloned(),
        Node::Literal(inner) => Ok(inner.clone()),
        Node::Data => Ok(match params {
            JsonValue::Array(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| resolve_parameters(item, results))
                    .collect::<Result<_, _>>()?,
            ),
            JsonValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(key, value)| Ok((key.clone(), resolve_parameters(value, results)?)))
                    .collect::<Result<_, ReferenceError>>()?,
            ),
            other => other.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::result::{CallError, CallErrorCode, ResultMetadata};
    use serde_json::json;

    fn results() -> HashMap<String, CallResult> {
        let mut map = HashMap::new();
        map.insert(
            "1".to_string(),
            CallResult::success(
                "1",
                "list_files",
                json!({"files": [{"name": "a.rs"}, {"name": "b.rs"}], "count": 2}),
                ResultMetadata::default(),
            ),
        );
        map.insert(
            "2".to_string(),
            CallResult::failure(
                "2",
                "read_file",
                CallError::new(CallErrorCode::NotFound, "missing"),
                ResultMetadata::default(),
            ),
        );
        map
    }

    #[test]
    fn test_parse_field_path() {
        let path = FieldPath::parse("files[0].name").unwrap();
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("files".into()),
                PathSegment::Index(0),
                PathSegment::Key("name".into())
            ]
        );
        assert_eq!(path.to_string(), "files[0].name");

        assert!(FieldPath::parse("").unwrap().is_root());
        assert_eq!(
            FieldPath::parse("[1][2]").unwrap().segments(),
            &[PathSegment::Index(1), PathSegment::Index(2)]
        );
    }

    #[test]
    fn test_parse_field_path_rejects_malformed_input() {
        for bad in ["a..b", "a.", "files[x]", "files[0", "files[-1]", ".a"] {
            assert!(
                matches!(FieldPath::parse(bad), Err(ReferenceError::InvalidPath { .. })),
                "expected '{}' to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_call_ref_builds_marker_object() {
        let value = call_ref("1", "files[1].name").unwrap();
        assert_eq!(value, json!({"$call.ref": "1", "path": "files[1].name"}));

        let parsed = ParamRef::from_value(&value).unwrap().unwrap();
        assert_eq!(parsed.call_id, "1");
        assert_eq!(parsed.to_value(), value);

        assert_eq!(call_ref("1", "").unwrap(), json!({"$call.ref": "1"}));
        assert!(call_ref("1", "files[").is_err());
    }

    #[test]
    fn test_plain_values_are_not_references() {
        for value in [
            json!("src/lib.rs"),
            json!({"path": "x"}),
            json!(3),
            json!("{{ 1.files[0] }}"),
            json!("{{ title }}"),
            json!({"$ref": "#/definitions/Foo"}),
            json!({"$ref": "1", "path": "files"}),
        ] {
            assert!(ParamRef::from_value(&value).unwrap().is_none(), "{}", value);
        }
    }

    #[test]
    fn test_malformed_markers_are_errors() {
        assert!(ParamRef::from_value(&json!({"$call.ref": 1})).is_err());
        assert!(ParamRef::from_value(&json!({"$call.ref": "  "})).is_err());
        assert!(ParamRef::from_value(&json!({"$call.ref": "1", "extra": true})).is_err());
        assert!(ParamRef::from_value(&json!({"$call.ref": "1", "path": 3})).is_err());
        assert!(ParamRef::from_value(&json!({"$call.literal": 1, "other": 2})).is_err());
    }

    #[test]
    fn test_collect_references_in_document_order() {
        let params = json!({
            "a": {"$call.ref": "1"},
            "b": [
                {"$call.literal": {"$call.ref": "9"}},
                {"nested": {"$call.ref": "3", "path": "x"}}
            ],
            "c": "{{ 2.path }}"
        });
        let ids: Vec<String> = collect_references(&params)
            .unwrap()
            .into_iter()
            .map(|r| r.call_id)
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_resolve_replaces_reference_nodes() {
        let params = json!({
            "path": {"$call.ref": "1", "path": "files[0].name"},
            "all": {"$call.ref": "1"},
            "count": {"$call.ref": "1", "path": "count"},
            "mode": "overwrite"
        });
        let resolved = resolve_parameters(&params, &results()).unwrap();
        assert_eq!(resolved["path"], json!("a.rs"));
        assert_eq!(resolved["all"]["count"], json!(2));
        assert_eq!(resolved["count"], json!(2));
        assert_eq!(resolved["mode"], json!("overwrite"));
    }

    #[test]
    fn test_resolve_leaves_literal_data_untouched() {
        let params = json!({
            "template": "{{ title }}",
            "body": "{{ 1 }}",
            "schema": {"$ref": "#/definitions/Foo", "definitions": {"Foo": {}}},
            "escaped": {"$call.literal": {"$call.ref": "1", "path": "count"}}
        });
        let resolved = resolve_parameters(&params, &results()).unwrap();

        assert_eq!(resolved["template"], json!("{{ title }}"));
        assert_eq!(resolved["body"], json!("{{ 1 }}"));
        assert_eq!(resolved["schema"], params["schema"]);
        assert_eq!(resolved["escaped"], json!({"$call.ref": "1", "path": "count"}));
    }

    #[test]
    fn test_literal_round_trips_any_value() {
        for value in [json!(null), json!("{{ x }}"), json!({"$call.literal": 1})] {
            assert_eq!(
                resolve_parameters(&literal(value.clone()), &HashMap::new()).unwrap(),
                value
            );
        }
    }

    #[test]
    fn test_resolve_errors() {
        let results = results();
        assert_eq!(
            resolve_parameters(&json!({"$call.ref": "9"}), &results),
            Err(ReferenceError::MissingResult {
                call_id: "9".into()
            })
        );
        assert_eq!(
            resolve_parameters(&call_ref("2", "content").unwrap(), &results),
            Err(ReferenceError::FailedDependency {
                call_id: "2".into()
            })
        );
        assert_eq!(
            resolve_parameters(&call_ref("1", "files[5].name").unwrap(), &results),
            Err(ReferenceError::MissingField {
                call_id: "1".into(),
                path: "files[5].name".into()
            })
        );
    }
}
