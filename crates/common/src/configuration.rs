use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, ValidationError};
use crate::prompt::PromptRenderer;
use crate::schema::{RawSchema, SchemaDescriptor, SchemaRole};

pub const DEFAULT_MODEL: &str = "gpt-4-turbo";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromptMessageTemplate {
    pub role: String,
    pub content: String,
}

/// Contents of one config file. The route path is not part of the file; it
/// is derived from where the file sits in the config tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigDocument {
    pub output_schema: RawSchema,
    pub input_schema: RawSchema,
    #[serde(default)]
    pub prompt: Vec<PromptMessageTemplate>,
    #[serde(default)]
    pub model: Option<String>,
}

/// A validated endpoint definition.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    path: String,
    output_schema: SchemaDescriptor,
    input_schema: SchemaDescriptor,
    prompt: Vec<PromptMessageTemplate>,
    renderer: Arc<PromptRenderer>,
    model: String,
}

// The renderer is compiled from `prompt` and `input_schema`.
impl PartialEq for ConfigDocument {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.output_schema == other.output_schema
            && self.input_schema == other.input_schema
            && self.prompt == other.prompt
            && self.model == other.model
    }
}

impl Eq for ConfigDocument {}

impl ConfigDocument {
    pub fn new(path: impl Into<String>, raw: RawConfigDocument) -> Result<Self, ValidationError> {
        let path = path.into();
        check_route_path(&path)?;

        let output_schema = SchemaDescriptor::from_raw(raw.output_schema, SchemaRole::Output)
            .map_err(|err| err.within("output_schema"))?;
        let input_schema = SchemaDescriptor::from_raw(raw.input_schema, SchemaRole::Input)
            .map_err(|err| err.within("input_schema"))?;

        if raw.prompt.is_empty() {
            return Err(ValidationError::new(
                "prompt",
                "at least one message is required",
            ));
        }
        for (index, message) in raw.prompt.iter().enumerate() {
            if message.role.trim().is_empty() {
                return Err(ValidationError::new(
                    format!("prompt[{index}].role"),
                    "must not be empty",
                ));
            }
        }
        let renderer = PromptRenderer::new(&raw.prompt, &input_schema)?;

        let model = match raw.model {
            Some(model) if model.trim().is_empty() => {
                return Err(ValidationError::new("model", "must not be empty"));
            }
            Some(model) => model,
            None => DEFAULT_MODEL.to_string(),
        };

        Ok(Self {
            path,
            output_schema,
            input_schema,
            prompt: raw.prompt,
            renderer: Arc::new(renderer),
            model,
        })
    }

    /// Parses and validates a YAML document. `source` labels errors.
    pub fn from_yaml(path: &str, yaml: &str, source: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfigDocument =
            serde_yaml::from_str(yaml).map_err(|err| ConfigError::Parse {
                path: source.to_path_buf(),
                source: err,
            })?;
        Self::new(path, raw).map_err(|err| ConfigError::Invalid {
            path: source.to_path_buf(),
            source: err,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn output_schema(&self) -> &SchemaDescriptor {
        &self.output_schema
    }

    pub fn input_schema(&self) -> &SchemaDescriptor {
        &self.input_schema
    }

    pub fn prompt(&self) -> &[PromptMessageTemplate] {
        &self.prompt
    }

    pub fn renderer(&self) -> &PromptRenderer {
        &self.renderer
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Route paths are served verbatim, so every segment is restricted to
/// characters that need no percent-encoding in a URI path.
fn check_route_path(path: &str) -> Result<(), ValidationError> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err(ValidationError::new("path", "path must be absolute"));
    };
    for segment in rest.split('/') {
        if segment.is_empty() {
            return Err(ValidationError::new("path", "path segments must not be empty"));
        }
        if let Some(c) = segment
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~')))
        {
            return Err(ValidationError::new(
                "path",
                format!(
                    "segment '{segment}' contains '{c}', only ASCII letters, digits and -_.~ are allowed"
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_type::FieldTypeTag;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const EXTRACT_USER: &str = r#"
output_schema:
  name: User
  prompt: A person mentioned in the text
  properties:
    - title: name
      type: str
      prompt: Full name
    - title: age
      type: int
input_schema:
  name: In
  properties:
    - title: text
      type: str
prompt:
  - role: user
    content: "Extract user from `{{text}}`"
"#;

    fn source() -> PathBuf {
        PathBuf::from("configs/extract_user.yaml")
    }

    #[test]
    fn parses_document_and_applies_default_model() {
        let doc = ConfigDocument::from_yaml("/extract_user", EXTRACT_USER, &source()).unwrap();

        assert_eq!(doc.path(), "/extract_user");
        assert_eq!(doc.model(), DEFAULT_MODEL);
        assert_eq!(doc.output_schema().name(), "User");
        assert_eq!(
            doc.output_schema().prompt(),
            Some("A person mentioned in the text")
        );
        assert_eq!(doc.output_schema().properties()[0].prompt(), Some("Full name"));
        assert_eq!(
            doc.output_schema().properties()[1].field_type(),
            FieldTypeTag::Int
        );
        assert_eq!(doc.input_schema().properties()[0].title(), "text");
        assert_eq!(
            doc.prompt(),
            &[PromptMessageTemplate {
                role: "user".to_string(),
                content: "Extract user from `{{text}}`".to_string(),
            }]
        );
    }

    #[test]
    fn explicit_model_is_kept() {
        let yaml = format!("{EXTRACT_USER}model: gpt-4o-mini\n");
        let doc = ConfigDocument::from_yaml("/extract_user", &yaml, &source()).unwrap();
        assert_eq!(doc.model(), "gpt-4o-mini");
    }

    #[test]
    fn relative_path_is_rejected() {
        let err = ConfigDocument::from_yaml("extract_user", EXTRACT_USER, &source()).unwrap_err();
        match err {
            ConfigError::Invalid { source, .. } => assert_eq!(source.field, "path"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn paths_that_need_percent_encoding_are_rejected() {
        for path in ["/my extract", "/na\u{ef}ve", "/orders/extract?x", "/a//b", "/"] {
            let err = ConfigDocument::from_yaml(path, EXTRACT_USER, &source()).unwrap_err();
            match err {
                ConfigError::Invalid { source, .. } => assert_eq!(source.field, "path", "{path}"),
                other => panic!("unexpected error for {path}: {other}"),
            }
        }
        let doc = ConfigDocument::from_yaml("/v1.users/extract-user_2~", EXTRACT_USER, &source());
        assert!(doc.is_ok());
    }

    #[test]
    fn nested_schema_errors_carry_their_location() {
        let yaml = EXTRACT_USER.replace("type: int", "type: integer");
        let err = ConfigDocument::from_yaml("/extract_user", &yaml, &source()).unwrap_err();
        match err {
            ConfigError::Invalid { path, source } => {
                assert_eq!(path, PathBuf::from("configs/extract_user.yaml"));
                assert_eq!(source.field, "output_schema.properties[1].type");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_prompt_is_rejected() {
        let yaml = r#"
output_schema: {name: User, properties: [{title: name, type: str}]}
input_schema: {name: In, properties: [{title: text, type: str}]}
prompt: []
"#;
        let err = ConfigDocument::from_yaml("/u", yaml, &source()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref source, .. } if source.field == "prompt"));
    }

    #[test]
    fn template_syntax_errors_fail_at_load() {
        let yaml = EXTRACT_USER.replace("`{{text}}`", "`{{text`");
        let err = ConfigDocument::from_yaml("/extract_user", &yaml, &source()).unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref source, .. } if source.field == "prompt[0].content")
        );
    }

    #[test]
    fn document_carries_its_compiled_prompt() {
        let doc = ConfigDocument::from_yaml("/extract_user", EXTRACT_USER, &source()).unwrap();
        let input = serde_json::from_value(serde_json::json!({"text": "Ada is 36"})).unwrap();

        let messages = doc.renderer().render(&input).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, "Extract user from `Ada is 36`");
    }

    #[test]
    fn placeholders_outside_the_input_schema_fail_at_load() {
        for content in ["{{ transcript }}", "{{ get_env(name='OPENAI_API_KEY') }}"] {
            let yaml = EXTRACT_USER.replace("`{{text}}`", &format!("'{content}'"));
            let err = ConfigDocument::from_yaml("/extract_user", &yaml, &source()).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { ref source, .. } if source.field == "prompt[0].content"),
                "{content}: {err}"
            );
        }
    }

    #[test]
    fn unknown_keys_and_malformed_yaml_fail_to_parse() {
        let yaml = format!("{EXTRACT_USER}temperature: 0.2\n");
        assert!(matches!(
            ConfigDocument::from_yaml("/extract_user", &yaml, &source()),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            ConfigDocument::from_yaml("/extract_user", "output_schema: [", &source()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
