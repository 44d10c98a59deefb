use std::sync::Arc;

use serde_json::{json, Value};

use crate::schema::{SchemaMismatch, TargetSchema};

/// Object with a required string `name`.
pub(crate) struct NameSchema {
    schema: Value,
}

impl NameSchema {
    pub(crate) fn new() -> Arc<dyn TargetSchema> {
        Arc::new(Self {
            schema: json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"],
                "additionalProperties": false,
            }),
        })
    }
}

impl TargetSchema for NameSchema {
    fn name(&self) -> &str {
        "Named"
    }

    fn json_schema(&self) -> &Value {
        &self.schema
    }

    fn validate(&self, value: &Value) -> Result<Value, SchemaMismatch> {
        match value.get("name") {
            Some(Value::String(_)) => Ok(value.clone()),
            _ => Err(SchemaMismatch::new("name: field required")),
        }
    }

    fn partial(&self, value: &Value) -> Value {
        json!({"name": value.get("name").cloned().unwrap_or(Value::Null)})
    }
}
