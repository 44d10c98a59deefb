use serde_json::{json, Map, Value};

use crate::compiler::{RouteDefinition, RouteKind, RouteTable};

pub const OPENAPI_PATH: &str = "/openapi.json";

/// OpenAPI 3.1 description of every compiled route.
pub fn openapi_document(routes: &RouteTable) -> Value {
    let mut paths = Map::new();
    for route in routes.iter() {
        paths.insert(route.path.clone(), json!({ "post": operation(route) }));
    }

    json!({
        "openapi": "3.1.0",
        "info": {
            "title": "schemagate",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": paths,
    })
}

fn operation(route: &RouteDefinition) -> Value {
    let endpoint = &route.endpoint;
    let output = endpoint.output_model().json_schema().clone();
    let summary = match route.kind {
        RouteKind::Single => format!("Extract one {}", endpoint.output_model().name()),
        RouteKind::List => format!("Extract a list of {}", endpoint.output_model().name()),
        RouteKind::ListStream => format!("Stream a list of {}", endpoint.output_model().name()),
        RouteKind::Stream => format!("Stream a partial {}", endpoint.output_model().name()),
    };
    let content = match route.kind {
        RouteKind::Single => json!({ "application/json": { "schema": output } }),
        RouteKind::List => json!({
            "application/json": { "schema": { "type": "array", "items": output } }
        }),
        RouteKind::ListStream | RouteKind::Stream => json!({
            "text/event-stream": {
                "schema": {
                    "type": "string",
                    "description": "`data: <json>` events, one per instance",
                },
                "x-event-schema": output,
            }
        }),
    };

    json!({
        "operationId": operation_id(&route.path),
        "summary": summary,
        "x-model": endpoint.model(),
        "requestBody": {
            "required": true,
            "content": {
                "application/json": { "schema": endpoint.input_model().json_schema() }
            }
        },
        "responses": {
            "200": { "description": "Successful extraction", "content": content },
            "422": { "description": "Request body does not match the input schema" },
            "502": { "description": "The model call failed" },
        }
    })
}

/// `/people/extract/list` -> `people_extract_list`
fn operation_id(path: &str) -> String {
    path.trim_start_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use common::ConfigDocument;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    const CONFIG: &str = r#"
output_schema:
  name: User
  properties:
    - title: name
      type: str
input_schema:
  name: In
  properties:
    - title: text
      type: str
prompt:
  - role: user
    content: "{{ text }}"
"#;

    #[test]
    fn describes_every_route() {
        let document =
            ConfigDocument::from_yaml("/people/extract", CONFIG, Path::new("t.yaml")).unwrap();
        let doc = openapi_document(&compile([document]).unwrap());

        assert_eq!(doc["openapi"], "3.1.0");
        let paths = doc["paths"].as_object().unwrap();
        assert_eq!(paths.len(), 4);

        let list = &paths["/people/extract/list"]["post"];
        assert_eq!(list["operationId"], "people_extract_list");
        assert_eq!(
            list["responses"]["200"]["content"]["application/json"]["schema"]["items"]["title"],
            "User"
        );
        assert_eq!(
            list["requestBody"]["content"]["application/json"]["schema"]["required"],
            json!(["text"])
        );
        assert!(paths["/people/extract/stream"]["post"]["responses"]["200"]["content"]
            .get("text/event-stream")
            .is_some());
    }
}
