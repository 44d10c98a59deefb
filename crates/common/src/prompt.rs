use extractllm::Message;
use tera::ast::{ExprVal, Node};
use tera::{Context, Tera};

use crate::configuration::PromptMessageTemplate;
use crate::errors::{error_chain, RenderError, ValidationError};
use crate::model::ModelInstance;
use crate::schema::SchemaDescriptor;

/// Compiled prompt-message templates of one endpoint.
///
/// Templates may only hold text, comments and bare `{{ field }}`
/// placeholders naming declared input fields. Tags, filters, function
/// calls and any other variable are rejected when the templates are
/// compiled, so rendering never reads anything but the input instance.
#[derive(Debug)]
pub struct PromptRenderer {
    tera: Tera,
    messages: Vec<CompiledMessage>,
}

#[derive(Debug)]
struct CompiledMessage {
    role: String,
    template_name: String,
}

impl PromptRenderer {
    pub fn new(
        templates: &[PromptMessageTemplate],
        input: &SchemaDescriptor,
    ) -> Result<Self, ValidationError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);

        let mut messages = Vec::with_capacity(templates.len());
        for (index, template) in templates.iter().enumerate() {
            let template_name = format!("prompt[{index}]");
            let field = format!("{template_name}.content");
            tera.add_raw_template(&template_name, &template.content)
                .map_err(|err| ValidationError::new(field.clone(), error_chain(&err)))?;
            let compiled = tera
                .get_template(&template_name)
                .map_err(|err| ValidationError::new(field.clone(), error_chain(&err)))?;
            for node in &compiled.ast {
                check_node(node, input)
                    .map_err(|reason| ValidationError::new(field.clone(), reason))?;
            }
            messages.push(CompiledMessage {
                role: template.role.clone(),
                template_name,
            });
        }

        Ok(Self { tera, messages })
    }

    pub fn render(&self, input: &ModelInstance) -> Result<Vec<Message>, RenderError> {
        let context = Context::from_serialize(input).map_err(|err| RenderError {
            index: 0,
            role: String::new(),
            reason: error_chain(&err),
        })?;

        self.messages
            .iter()
            .enumerate()
            .map(|(index, message)| {
                self.tera
                    .render(&message.template_name, &context)
                    .map(|content| Message::new(message.role.clone(), content))
                    .map_err(|err| RenderError {
                        index,
                        role: message.role.clone(),
                        reason: error_chain(&err),
                    })
            })
            .collect()
    }
}

fn check_node(node: &Node, input: &SchemaDescriptor) -> Result<(), String> {
    match node {
        Node::Text(_) | Node::Comment(..) | Node::Raw(..) => Ok(()),
        Node::VariableBlock(_, expr) => {
            let ExprVal::Ident(name) = &expr.val else {
                return Err("placeholders must name an input field".to_string());
            };
            if expr.negated || !expr.filters.is_empty() {
                return Err(format!("placeholder `{name}` must not use operators or filters"));
            }
            if !input.properties().iter().any(|field| field.title() == name) {
                return Err(format!(
                    "`{name}` is not a field of input schema '{}'",
                    input.name()
                ));
            }
            Ok(())
        }
        _ => Err("only `{{ field }}` placeholders are supported, tags are not".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawProperty, RawSchema, SchemaRole};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn template(role: &str, content: &str) -> PromptMessageTemplate {
        PromptMessageTemplate {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    fn input_schema(titles: &[&str]) -> SchemaDescriptor {
        let raw = RawSchema {
            name: "In".to_string(),
            prompt: None,
            properties: titles
                .iter()
                .map(|title| RawProperty {
                    title: title.to_string(),
                    field_type: "str".to_string(),
                    prompt: None,
                })
                .collect(),
        };
        SchemaDescriptor::from_raw(raw, SchemaRole::Input).unwrap()
    }

    fn input(value: serde_json::Value) -> ModelInstance {
        serde_json::from_value(value).unwrap()
    }

    fn rejection(content: &str) -> ValidationError {
        PromptRenderer::new(
            &[template("system", "ok"), template("user", content)],
            &input_schema(&["text"]),
        )
        .unwrap_err()
    }

    #[test]
    fn substitutes_fields_and_keeps_order_and_roles() {
        let renderer = PromptRenderer::new(
            &[
                template("system", "You extract users."),
                template("user", "Extract user from `{{text}}` in {{ lang }}"),
            ],
            &input_schema(&["text", "lang"]),
        )
        .unwrap();

        let messages = renderer
            .render(&input(json!({"text": "Ada is 36", "lang": "en"})))
            .unwrap();

        assert_eq!(
            messages,
            vec![
                Message::new("system", "You extract users."),
                Message::new("user", "Extract user from `Ada is 36` in en"),
            ]
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        let renderer = PromptRenderer::new(
            &[template("user", "{{ a }} / {{ b }} / {{ tags }}")],
            &input_schema(&["a", "b", "tags"]),
        )
        .unwrap();
        let instance = input(json!({"a": 1, "b": true, "tags": ["x", "y"]}));

        let first = renderer.render(&instance).unwrap();
        let second = renderer.render(&instance).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn undeclared_placeholder_is_rejected_at_compile_time() {
        let err = rejection("Extract from {{ body }}");
        assert_eq!(err.field, "prompt[1].content");
        assert!(err.reason.contains("body"), "{}", err.reason);
    }

    #[test]
    fn template_functions_are_rejected() {
        let err = rejection(r#"{{ get_env(name="OPENAI_API_KEY") }}"#);
        assert_eq!(err.field, "prompt[1].content");

        let err = rejection(r#"{{ text ~ get_env(name="HOME") }}"#);
        assert_eq!(err.field, "prompt[1].content");
    }

    #[test]
    fn whole_context_variable_is_rejected() {
        let err = rejection("{{ __tera_context }}");
        assert_eq!(err.field, "prompt[1].content");
        assert!(err.reason.contains("__tera_context"), "{}", err.reason);
    }

    #[test]
    fn tags_and_filters_are_rejected() {
        for content in [
            "{% set secret = 1 %}{{ text }}",
            "{% if text %}{{ text }}{% endif %}",
            "{% for c in text %}{{ c }}{% endfor %}",
            "{% include \"other\" %}",
            "{{ text | upper }}",
            "{{ not text }}",
            "{{ text.len }}",
        ] {
            let err = rejection(content);
            assert_eq!(err.field, "prompt[1].content", "{content}");
        }
    }

    #[test]
    fn comments_and_raw_text_are_allowed() {
        let renderer = PromptRenderer::new(
            &[template("user", "{# note #}{{ text }} {% raw %}{{ kept }}{% endraw %}")],
            &input_schema(&["text"]),
        )
        .unwrap();
        let messages = renderer.render(&input(json!({"text": "Ada"}))).unwrap();
        assert_eq!(messages[0].content, "Ada {{ kept }}");
    }

    #[test]
    fn missing_value_fails_render_with_message_index() {
        let renderer = PromptRenderer::new(
            &[template("system", "ok"), template("user", "{{ text }} {{ lang }}")],
            &input_schema(&["text", "lang"]),
        )
        .unwrap();

        let err = renderer
            .render(&input(json!({"text": "Ada"})))
            .unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.role, "user");
        assert!(err.reason.contains("lang"), "{}", err.reason);
    }

    #[test]
    fn values_are_not_html_escaped() {
        let renderer =
            PromptRenderer::new(&[template("user", "{{ text }}")], &input_schema(&["text"]))
                .unwrap();
        let messages = renderer
            .render(&input(json!({"text": "<b>Tom & Jerry</b>"})))
            .unwrap();
        assert_eq!(messages[0].content, "<b>Tom & Jerry</b>");
    }

    #[test]
    fn syntax_errors_name_the_template() {
        let err = PromptRenderer::new(&[template("user", "{% if %}")], &input_schema(&["text"]))
            .unwrap_err();
        assert_eq!(err.field, "prompt[0].content");
    }
}
