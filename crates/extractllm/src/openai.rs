use std::future::ready;
use std::sync::Arc;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::accumulate::{accumulate, iterable_items, IterableAccumulator, PartialAccumulator};
use crate::apis::openai::{
    ChatCompletionsRequest, ChatCompletionsResponse, ChatCompletionsStreamResponse,
    JsonSchemaFormat, Message, ResponseFormat, CHAT_COMPLETIONS_PATH, STREAM_DONE_MARKER,
};
use crate::client::{CompletionClient, ObjectStream};
use crate::error::{ClientError, Result};
use crate::json::extract_json;
use crate::schema::{format_name, iterable_schema, TargetSchema};

/// [`CompletionClient`] for OpenAI-compatible chat-completion APIs using
/// `response_format: json_schema` structured outputs.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    /// `endpoint` is the API base, e.g. `https://api.openai.com/v1`.
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), endpoint, api_key)
    }

    pub fn with_http_client(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            client,
            endpoint,
            api_key,
        }
    }

    fn url(&self) -> String {
        format!("{}{}", self.endpoint, CHAT_COMPLETIONS_PATH)
    }

    fn build_request(
        model: &str,
        messages: Vec<Message>,
        name: &str,
        schema: Value,
        stream: bool,
    ) -> ChatCompletionsRequest {
        ChatCompletionsRequest {
            model: model.to_string(),
            messages,
            response_format: ResponseFormat::JsonSchema {
                json_schema: JsonSchemaFormat {
                    name: format_name(name),
                    schema,
                    strict: true,
                },
            },
            stream,
        }
    }

    async fn send(&self, request: &ChatCompletionsRequest) -> Result<reqwest::Response> {
        debug!(
            url = %self.url(),
            model = %request.model,
            target = %request_target(request),
            stream = request.stream,
            "sending chat completion request"
        );

        let mut builder = self.client.post(self.url()).json(request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "upstream rejected chat completion");
            return Err(ClientError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Text content of the first choice of a non-streaming completion.
    async fn complete_content(&self, request: &ChatCompletionsRequest) -> Result<String> {
        let response = self.send(request).await?;
        let body = response.text().await?;

        let parsed: ChatCompletionsResponse = serde_json::from_str(&body).map_err(|err| {
            warn!(error = %err, body = %body, "failed to parse json response");
            ClientError::Json(err)
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(ClientError::EmptyResponse)?;
        if let Some(refusal) = choice.message.refusal {
            return Err(ClientError::Refusal(refusal));
        }
        if choice.is_truncated() {
            warn!("chat completion stopped at the token limit");
            return Err(ClientError::Truncated);
        }
        match choice.message.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(ClientError::EmptyResponse),
        }
    }

    /// Content deltas of a streaming completion, ending at `[DONE]`.
    async fn stream_deltas(
        &self,
        request: &ChatCompletionsRequest,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let response = self.send(request).await?;

        let deltas = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                ready(!matches!(event, Ok(event) if event.data.trim() == STREAM_DONE_MARKER))
            })
            .filter_map(|event| {
                ready(match event {
                    Ok(event) => {
                        match serde_json::from_str::<ChatCompletionsStreamResponse>(&event.data) {
                            Ok(chunk) if chunk.is_truncated() => {
                                warn!("streamed completion stopped at the token limit");
                                Some(Err(ClientError::Truncated))
                            }
                            Ok(chunk) => chunk
                                .content()
                                .filter(|content| !content.is_empty())
                                .map(|content| Ok(content.to_string())),
                            Err(err) => {
                                warn!(error = %err, data = %event.data, "malformed stream chunk");
                                Some(Err(ClientError::Json(err)))
                            }
                        }
                    }
                    Err(err) => Some(Err(ClientError::Stream(err.to_string()))),
                })
            })
            .boxed();

        Ok(deltas)
    }
}

fn request_target(request: &ChatCompletionsRequest) -> &str {
    match &request.response_format {
        ResponseFormat::JsonSchema { json_schema } => &json_schema.name,
    }
}

fn validate(target: &dyn TargetSchema, value: &Value) -> Result<Value> {
    target
        .validate(value)
        .map_err(|source| ClientError::InvalidOutput {
            target: target.name().to_string(),
            source,
        })
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn create(
        &self,
        model: &str,
        messages: Vec<Message>,
        target: Arc<dyn TargetSchema>,
    ) -> Result<Value> {
        let request = Self::build_request(
            model,
            messages,
            target.name(),
            target.json_schema().clone(),
            false,
        );
        let content = self.complete_content(&request).await?;
        let value: Value = serde_json::from_str(extract_json(&content))?;
        validate(target.as_ref(), &value)
    }

    async fn create_iterable(
        &self,
        model: &str,
        messages: Vec<Message>,
        target: Arc<dyn TargetSchema>,
        stream: bool,
    ) -> Result<ObjectStream> {
        let name = format!("Iterable{}", target.name());
        let request = Self::build_request(
            model,
            messages,
            &name,
            iterable_schema(target.as_ref()),
            stream,
        );

        if stream {
            let deltas = self.stream_deltas(&request).await?;
            return Ok(accumulate(deltas, IterableAccumulator::new(target)));
        }

        let content = self.complete_content(&request).await?;
        let document: Value = serde_json::from_str(extract_json(&content))?;
        let items = iterable_items(&document)?
            .iter()
            .map(|item| validate(target.as_ref(), item))
            .collect::<Result<Vec<_>>>()?;
        Ok(stream::iter(items.into_iter().map(Ok)).boxed())
    }

    async fn create_partial(
        &self,
        model: &str,
        messages: Vec<Message>,
        target: Arc<dyn TargetSchema>,
    ) -> Result<ObjectStream> {
        let request = Self::build_request(
            model,
            messages,
            target.name(),
            target.json_schema().clone(),
            true,
        );
        let deltas = self.stream_deltas(&request).await?;
        Ok(accumulate(deltas, PartialAccumulator::new(target)))
    }
}
