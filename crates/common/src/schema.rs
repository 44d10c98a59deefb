use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::field_type::FieldTypeTag;

/// Whether a schema describes the request payload or the extracted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaRole {
    Input,
    Output,
}

/// A property as written in a config document, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawProperty {
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// A schema as written in a config document, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSchema {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub properties: Vec<RawProperty>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    title: String,
    field_type: FieldTypeTag,
    prompt: Option<String>,
}

impl FieldDescriptor {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn field_type(&self) -> FieldTypeTag {
        self.field_type
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    name: String,
    prompt: Option<String>,
    properties: Vec<FieldDescriptor>,
}

impl SchemaDescriptor {
    /// Validates a raw schema. Either every check passes or nothing is built.
    pub fn from_raw(raw: RawSchema, role: SchemaRole) -> Result<Self, ValidationError> {
        if raw.name.trim().is_empty() {
            return Err(ValidationError::new("name", "must not be empty"));
        }
        if role == SchemaRole::Input && raw.prompt.is_some() {
            return Err(ValidationError::new(
                "prompt",
                "only output schemas may carry a prompt",
            ));
        }
        if raw.properties.is_empty() {
            return Err(ValidationError::new(
                "properties",
                "at least one property is required",
            ));
        }

        let mut seen = HashSet::new();
        let mut properties = Vec::with_capacity(raw.properties.len());
        for (index, property) in raw.properties.into_iter().enumerate() {
            let field = validate_property(property, &mut seen).map_err(|err| {
                err.within(&format!("[{index}]")).within("properties")
            })?;
            properties.push(field);
        }

        Ok(Self {
            name: raw.name,
            prompt: raw.prompt,
            properties,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn properties(&self) -> &[FieldDescriptor] {
        &self.properties
    }
}

fn validate_property(
    raw: RawProperty,
    seen: &mut HashSet<String>,
) -> Result<FieldDescriptor, ValidationError> {
    if raw.title.is_empty() {
        return Err(ValidationError::new("title", "must not be empty"));
    }
    if !is_identifier(&raw.title) {
        return Err(ValidationError::new(
            "title",
            format!("'{}' is not a valid identifier", raw.title),
        ));
    }
    if !seen.insert(raw.title.clone()) {
        return Err(ValidationError::new(
            "title",
            format!("duplicate property '{}'", raw.title),
        ));
    }
    let field_type = raw
        .field_type
        .parse::<FieldTypeTag>()
        .map_err(|err| ValidationError::new("type", err.to_string()))?;

    Ok(FieldDescriptor {
        title: raw.title,
        field_type,
        prompt: raw.prompt,
    })
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn property(title: &str, field_type: &str) -> RawProperty {
        RawProperty {
            title: title.to_string(),
            field_type: field_type.to_string(),
            prompt: None,
        }
    }

    fn raw(properties: Vec<RawProperty>) -> RawSchema {
        RawSchema {
            name: "User".to_string(),
            prompt: None,
            properties,
        }
    }

    #[test]
    fn preserves_property_order() {
        let schema = SchemaDescriptor::from_raw(
            raw(vec![
                property("name", "str"),
                property("age", "int"),
                property("tags", "str[]"),
            ]),
            SchemaRole::Output,
        )
        .unwrap();

        let titles: Vec<&str> = schema.properties().iter().map(|p| p.title()).collect();
        assert_eq!(titles, vec!["name", "age", "tags"]);
        assert_eq!(schema.properties()[2].field_type(), FieldTypeTag::StrArray);
    }

    #[test]
    fn duplicate_titles_are_rejected() {
        let err = SchemaDescriptor::from_raw(
            raw(vec![property("name", "str"), property("name", "int")]),
            SchemaRole::Output,
        )
        .unwrap_err();
        assert_eq!(err.field, "properties[1].title");
        assert!(err.reason.contains("duplicate"));
    }

    #[test]
    fn unknown_type_names_the_property() {
        let err = SchemaDescriptor::from_raw(
            raw(vec![property("name", "str"), property("born", "date")]),
            SchemaRole::Output,
        )
        .unwrap_err();
        assert_eq!(err.field, "properties[1].type");
        assert!(err.reason.contains("'date'"));
    }

    #[test]
    fn empty_name_and_properties_are_rejected() {
        let mut no_name = raw(vec![property("a", "str")]);
        no_name.name = "  ".to_string();
        assert_eq!(
            SchemaDescriptor::from_raw(no_name, SchemaRole::Input)
                .unwrap_err()
                .field,
            "name"
        );

        assert_eq!(
            SchemaDescriptor::from_raw(raw(vec![]), SchemaRole::Input)
                .unwrap_err()
                .field,
            "properties"
        );
    }

    #[test]
    fn titles_must_be_identifiers() {
        for bad in ["", "first name", "1st", "a-b"] {
            let err = SchemaDescriptor::from_raw(raw(vec![property(bad, "str")]), SchemaRole::Output)
                .unwrap_err();
            assert_eq!(err.field, "properties[0].title", "title {bad:?}");
        }
        assert!(
            SchemaDescriptor::from_raw(raw(vec![property("_first_name2", "str")]), SchemaRole::Output)
                .is_ok()
        );
    }

    #[test]
    fn input_schemas_cannot_carry_a_prompt() {
        let mut with_prompt = raw(vec![property("text", "str")]);
        with_prompt.prompt = Some("ignored".to_string());
        let err = SchemaDescriptor::from_raw(with_prompt.clone(), SchemaRole::Input).unwrap_err();
        assert_eq!(err.field, "prompt");

        let output = SchemaDescriptor::from_raw(with_prompt, SchemaRole::Output).unwrap();
        assert_eq!(output.prompt(), Some("ignored"));
    }
}
