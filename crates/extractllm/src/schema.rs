use serde_json::{json, Value};
use thiserror::Error;

/// Key under which list extraction wraps the individual instances.
pub const ITERABLE_KEY: &str = "tasks";

/// A structure the model output must conform to.
///
/// Implementations own the JSON Schema sent upstream and the structural
/// checks applied to what comes back.
pub trait TargetSchema: Send + Sync {
    fn name(&self) -> &str;

    fn json_schema(&self) -> &Value;

    /// Checks a complete instance, returning its normalized form.
    fn validate(&self, value: &Value) -> Result<Value, SchemaMismatch>;

    /// Projects an incomplete instance onto the schema.
    fn partial(&self, value: &Value) -> Value;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", .problems.join("; "))]
pub struct SchemaMismatch {
    pub problems: Vec<String>,
}

impl SchemaMismatch {
    pub fn new(problem: impl Into<String>) -> Self {
        Self {
            problems: vec![problem.into()],
        }
    }
}

/// Name accepted by `response_format.json_schema.name` (`[a-zA-Z0-9_-]{1,64}`).
pub fn format_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if sanitized.is_empty() {
        "response".to_string()
    } else {
        sanitized
    }
}

/// Schema of `{"tasks": [<target>, ...]}` used for list extraction.
pub fn iterable_schema(target: &dyn TargetSchema) -> Value {
    json!({
        "type": "object",
        "title": format!("Iterable{}", target.name()),
        "properties": {
            ITERABLE_KEY: {
                "type": "array",
                "items": target.json_schema(),
            }
        },
        "required": [ITERABLE_KEY],
        "additionalProperties": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_name_replaces_disallowed_characters() {
        assert_eq!(format_name("User Profile"), "User_Profile");
        assert_eq!(format_name("Iterable-User_2"), "Iterable-User_2");
        assert_eq!(format_name(""), "response");
        assert_eq!(format_name(&"x".repeat(80)).len(), 64);
    }
}
