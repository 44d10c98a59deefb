use bytes::Bytes;
use common::{FieldError, RenderError, RequestValidationError};
use extractllm::ClientError;
use http_body_util::combinators::BoxBody;
use hyper::header::{HeaderValue, ALLOW};
use hyper::{Response, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;

use super::json_response;

/// Everything that can end an extraction request early.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no route for {0}")]
    NotFound(String),

    #[error("method {method} is not allowed on {path}")]
    MethodNotAllowed { method: String, path: String },

    #[error("failed to read request body: {0}")]
    UnreadableBody(String),

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidRequest(#[from] RequestValidationError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("model call failed: {0}")]
    Upstream(#[from] ClientError),
}

impl ExtractionError {
    pub fn status(&self) -> StatusCode {
        match self {
            ExtractionError::NotFound(_) => StatusCode::NOT_FOUND,
            ExtractionError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ExtractionError::UnreadableBody(_) => StatusCode::BAD_REQUEST,
            ExtractionError::MalformedJson(_) | ExtractionError::InvalidRequest(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ExtractionError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ExtractionError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ExtractionError::NotFound(_) => "NotFound",
            ExtractionError::MethodNotAllowed { .. } => "MethodNotAllowed",
            ExtractionError::UnreadableBody(_) => "InvalidRequest",
            ExtractionError::MalformedJson(_) | ExtractionError::InvalidRequest(_) => {
                "RequestValidationError"
            }
            ExtractionError::Render(_) => "InternalServerError",
            ExtractionError::Upstream(_) => "UpstreamModelError",
        }
    }

    /// Template internals never reach the caller; they are logged instead.
    fn message(&self) -> String {
        match self {
            ExtractionError::Render(_) => "failed to build the model prompt".to_string(),
            other => other.to_string(),
        }
    }

    fn details(&self) -> Value {
        match self {
            ExtractionError::MalformedJson(err) => {
                json!([FieldError::new(["body"], err.to_string())])
            }
            ExtractionError::InvalidRequest(err) => {
                let errors: Vec<FieldError> = err
                    .errors
                    .iter()
                    .map(|e| {
                        FieldError::new(
                            std::iter::once("body".to_string()).chain(e.loc.iter().cloned()),
                            e.msg.clone(),
                        )
                    })
                    .collect();
                json!(errors)
            }
            ExtractionError::Upstream(ClientError::Upstream { status, .. }) => {
                json!({ "upstream_status": status })
            }
            _ => json!({}),
        }
    }

    pub fn into_response(self) -> Response<BoxBody<Bytes, hyper::Error>> {
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.message(),
                "details": self.details(),
            }
        });
        let mut response = json_response(self.status(), &body);
        if let ExtractionError::MethodNotAllowed { .. } = self {
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("POST"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;

    async fn body_json(response: Response<BoxBody<Bytes, hyper::Error>>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_errors_locate_fields_in_the_body() {
        let err = ExtractionError::from(RequestValidationError {
            model: "In".to_string(),
            errors: vec![FieldError::new(["text"], "field required")],
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(response).await["error"]["details"],
            json!([{"loc": ["body", "text"], "msg": "field required"}])
        );
    }

    #[tokio::test]
    async fn render_errors_hide_template_details() {
        let err = ExtractionError::from(RenderError {
            index: 0,
            role: "user".to_string(),
            reason: "Variable `secret` not found".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(!body.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn upstream_errors_map_to_bad_gateway() {
        let err = ExtractionError::from(ClientError::Upstream {
            status: 429,
            body: "rate limited".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "UpstreamModelError");
        assert_eq!(body["error"]["details"]["upstream_status"], 429);
    }

    #[test]
    fn method_not_allowed_advertises_post() {
        let response = ExtractionError::MethodNotAllowed {
            method: "GET".to_string(),
            path: "/extract_user".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "POST");
    }
}
