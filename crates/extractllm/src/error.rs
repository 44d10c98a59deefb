use thiserror::Error;

use crate::schema::SchemaMismatch;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to send request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned status={status}, body={body}")]
    Upstream { status: u16, body: String },

    #[error("Failed to parse upstream response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model returned no content")]
    EmptyResponse,

    #[error("model refused the request: {0}")]
    Refusal(String),

    #[error("model output was truncated (finish_reason=length)")]
    Truncated,

    #[error("model output does not match `{target}`: {source}")]
    InvalidOutput {
        target: String,
        #[source]
        source: SchemaMismatch,
    },

    #[error("error in streaming response: {0}")]
    Stream(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
