//! Data models built at runtime from schema descriptors.
//!
//! A [`ModelType`] is the synthesized counterpart of a [`SchemaDescriptor`]:
//! it keeps the field order, types and documentation of the descriptor, owns
//! the JSON Schema handed to the model-call client and checks payloads
//! against it. Values of a model are [`ModelInstance`]s.

use std::fmt;

use extractllm::{SchemaMismatch, TargetSchema};
use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::{error_chain, FieldError, RequestValidationError, ValidationError};
use crate::field_type::{resolve, ConcreteType};
use crate::schema::{SchemaDescriptor, SchemaRole};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelField {
    name: String,
    concrete_type: ConcreteType,
    description: Option<String>,
}

impl ModelField {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn concrete_type(&self) -> ConcreteType {
        self.concrete_type
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

pub struct ModelType {
    name: String,
    description: Option<String>,
    fields: Vec<ModelField>,
    schema: Value,
    validator: Validator,
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// Builds the model type for `schema`. Every field is required; output
/// models carry the schema and property prompts as documentation.
pub fn synthesize(schema: &SchemaDescriptor, role: SchemaRole) -> Result<ModelType, ValidationError> {
    let documented = role == SchemaRole::Output;

    let fields: Vec<ModelField> = schema
        .properties()
        .iter()
        .map(|property| ModelField {
            name: property.title().to_string(),
            concrete_type: resolve(property.field_type()),
            description: property
                .prompt()
                .filter(|_| documented)
                .map(str::to_string),
        })
        .collect();
    let description = schema
        .prompt()
        .filter(|_| documented)
        .map(str::to_string);

    let json_schema = build_json_schema(schema.name(), description.as_deref(), &fields);
    let validator = Validator::new(&json_schema)
        .map_err(|err| ValidationError::new(schema.name(), error_chain(&err)))?;

    Ok(ModelType {
        name: schema.name().to_string(),
        description,
        fields,
        schema: json_schema,
        validator,
    })
}

fn build_json_schema(name: &str, description: Option<&str>, fields: &[ModelField]) -> Value {
    let mut properties = Map::new();
    for field in fields {
        let mut property = field.concrete_type.json_schema();
        if let (Some(text), Value::Object(object)) = (field.description(), &mut property) {
            object.insert("description".to_string(), Value::String(text.to_string()));
        }
        properties.insert(field.name.clone(), property);
    }
    let required: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();

    let mut schema = json!({
        "type": "object",
        "title": name,
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    });
    if let (Some(text), Value::Object(object)) = (description, &mut schema) {
        object.insert("description".to_string(), Value::String(text.to_string()));
    }
    schema
}

impl ModelType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn fields(&self) -> &[ModelField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&ModelField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn json_schema(&self) -> &Value {
        &self.schema
    }

    /// Builds an instance from untrusted data, reporting every missing,
    /// unknown or mistyped field.
    pub fn instantiate(&self, raw: &Value) -> Result<ModelInstance, RequestValidationError> {
        let Some(object) = raw.as_object() else {
            return Err(self.rejection(vec![FieldError::new(
                Vec::<String>::new(),
                "expected a JSON object",
            )]));
        };

        let mut errors = Vec::new();
        for field in &self.fields {
            if !object.contains_key(&field.name) {
                errors.push(FieldError::new([field.name.as_str()], "field required"));
            }
        }
        for key in object.keys() {
            if self.field(key).is_none() {
                errors.push(FieldError::new([key.as_str()], "extra fields not permitted"));
            }
        }
        for error in self.validator.iter_errors(raw) {
            let pointer = error.instance_path.to_string();
            // root-level problems are the missing/extra fields reported above
            if pointer.is_empty() {
                continue;
            }
            let loc: Vec<String> = pointer
                .trim_start_matches('/')
                .split('/')
                .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
                .collect();
            errors.push(FieldError {
                loc,
                msg: error.to_string(),
            });
        }

        if !errors.is_empty() {
            return Err(self.rejection(errors));
        }

        let values = self
            .fields
            .iter()
            .map(|field| {
                let value = object.get(&field.name).cloned().unwrap_or(Value::Null);
                (field.name.clone(), value)
            })
            .collect();
        Ok(ModelInstance(values))
    }

    /// Projects an incomplete object onto this model: every declared field is
    /// present (`null` when not produced yet), unknown keys are dropped.
    pub fn partial(&self, raw: &Value) -> ModelInstance {
        let values = self
            .fields
            .iter()
            .map(|field| {
                let value = raw.get(&field.name).cloned().unwrap_or(Value::Null);
                (field.name.clone(), value)
            })
            .collect();
        ModelInstance(values)
    }

    fn rejection(&self, errors: Vec<FieldError>) -> RequestValidationError {
        RequestValidationError {
            model: self.name.clone(),
            errors,
        }
    }
}

impl TargetSchema for ModelType {
    fn name(&self) -> &str {
        &self.name
    }

    fn json_schema(&self) -> &Value {
        &self.schema
    }

    fn validate(&self, value: &Value) -> Result<Value, SchemaMismatch> {
        self.instantiate(value)
            .map(ModelInstance::into_value)
            .map_err(|err| SchemaMismatch {
                problems: err
                    .errors
                    .into_iter()
                    .map(|e| format!("{}: {}", e.loc.join("."), e.msg))
                    .collect(),
            })
    }

    fn partial(&self, value: &Value) -> Value {
        ModelType::partial(self, value).into_value()
    }
}

/// A value of a synthesized model: field values in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelInstance(Map<String, Value>);

impl ModelInstance {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawProperty, RawSchema};
    use pretty_assertions::assert_eq;

    fn descriptor(name: &str, prompt: Option<&str>, props: &[(&str, &str, Option<&str>)]) -> SchemaDescriptor {
        let raw = RawSchema {
            name: name.to_string(),
            prompt: prompt.map(str::to_string),
            properties: props
                .iter()
                .map(|(title, ty, prompt)| RawProperty {
                    title: title.to_string(),
                    field_type: ty.to_string(),
                    prompt: prompt.map(str::to_string),
                })
                .collect(),
        };
        SchemaDescriptor::from_raw(raw, SchemaRole::Output).unwrap()
    }

    fn user_model() -> ModelType {
        let schema = descriptor(
            "User",
            Some("A person"),
            &[
                ("name", "str", Some("Full name")),
                ("age", "int", None),
                ("scores", "float[]", None),
                ("active", "bool", None),
            ],
        );
        synthesize(&schema, SchemaRole::Output).unwrap()
    }

    #[test]
    fn fields_follow_declaration_order_with_docs() {
        let model = user_model();
        let names: Vec<&str> = model.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["name", "age", "scores", "active"]);
        assert_eq!(model.fields()[0].description(), Some("Full name"));
        assert_eq!(model.description(), Some("A person"));
        assert_eq!(
            model.json_schema()["required"],
            json!(["name", "age", "scores", "active"])
        );
        assert_eq!(
            model.json_schema()["properties"]["name"],
            json!({"type": "string", "description": "Full name"})
        );
        assert_eq!(model.json_schema()["additionalProperties"], json!(false));
    }

    #[test]
    fn input_models_drop_documentation() {
        let schema = descriptor("In", None, &[("text", "str", Some("ignored"))]);
        let model = synthesize(&schema, SchemaRole::Input).unwrap();
        assert_eq!(model.fields()[0].description(), None);
        assert_eq!(model.json_schema()["properties"]["text"], json!({"type": "string"}));
    }

    #[test]
    fn independent_syntheses_are_structurally_identical() {
        let schema = descriptor("User", None, &[("name", "str", None)]);
        let a = synthesize(&schema, SchemaRole::Output).unwrap();
        let b = synthesize(&schema, SchemaRole::Output).unwrap();
        assert_eq!(a.json_schema(), b.json_schema());
        assert_eq!(a.fields(), b.fields());
    }

    #[test]
    fn instantiate_accepts_valid_payload_in_field_order() {
        let model = user_model();
        let instance = model
            .instantiate(&json!({"active": true, "scores": [1.5, 2], "age": 36, "name": "Ada"}))
            .unwrap();
        let order: Vec<&String> = instance.fields().map(|(k, _)| k).collect();
        assert_eq!(order, vec!["name", "age", "scores", "active"]);
        assert_eq!(instance.get("age"), Some(&json!(36)));
    }

    #[test]
    fn instantiate_reports_missing_extra_and_mistyped_fields() {
        let model = user_model();
        let err = model
            .instantiate(&json!({"name": 7, "scores": [1.0, "x"], "active": true, "nick": "A"}))
            .unwrap_err();

        assert_eq!(err.model, "User");
        let locs: Vec<Vec<String>> = err.errors.iter().map(|e| e.loc.clone()).collect();
        assert!(locs.contains(&vec!["age".to_string()]));
        assert!(locs.contains(&vec!["nick".to_string()]));
        assert!(locs.contains(&vec!["name".to_string()]));
        assert!(locs.contains(&vec!["scores".to_string(), "1".to_string()]));
        let missing = err.errors.iter().find(|e| e.loc == ["age"]).unwrap();
        assert_eq!(missing.msg, "field required");
    }

    #[test]
    fn instantiate_rejects_non_objects_and_nulls() {
        let model = user_model();
        let err = model.instantiate(&json!(["Ada"])).unwrap_err();
        assert_eq!(err.errors[0].loc, Vec::<String>::new());

        let err = model
            .instantiate(&json!({"name": null, "age": 1, "scores": [], "active": false}))
            .unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].loc, vec!["name".to_string()]);
    }

    #[test]
    fn instances_round_trip_through_json() {
        let model = user_model();
        let instance = model
            .instantiate(&json!({"name": "Ada", "age": 36, "scores": [0.5], "active": false}))
            .unwrap();

        let text = serde_json::to_string(&instance).unwrap();
        assert_eq!(text, r#"{"name":"Ada","age":36,"scores":[0.5],"active":false}"#);
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(model.instantiate(&parsed).unwrap(), instance);
    }

    #[test]
    fn partial_fills_missing_fields_with_null() {
        let model = user_model();
        let partial = model.partial(&json!({"age": 36, "unknown": 1}));
        assert_eq!(
            partial.into_value(),
            json!({"name": null, "age": 36, "scores": null, "active": null})
        );
    }

    #[test]
    fn target_schema_validation_reports_problems() {
        let model = user_model();
        let err = TargetSchema::validate(&model, &json!({"name": "Ada"})).unwrap_err();
        assert!(err.problems.iter().any(|p| p == "age: field required"));
        assert_eq!(TargetSchema::name(&model), "User");
    }
}
