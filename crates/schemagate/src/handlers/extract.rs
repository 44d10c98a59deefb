use std::sync::Arc;

use bytes::Bytes;
use extractllm::{CompletionClient, Message};
use futures::TryStreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::HeaderValue;
use hyper::{Request, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};

use super::errors::ExtractionError;
use super::json_response;
use super::request::{extract_request_id, REQUEST_ID_HEADER};
use super::stream::create_event_stream_response;
use crate::compiler::{CompiledEndpoint, RouteDefinition, RouteKind};

pub async fn extract<B>(
    request: Request<B>,
    route: RouteDefinition,
    client: Arc<dyn CompletionClient>,
) -> Response<BoxBody<Bytes, hyper::Error>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let request_id = extract_request_id(&request);

    let request_span = info_span!(
        "extract",
        request_id = %request_id,
        http.path = %route.path,
        route.kind = %route.kind,
        llm.model = %route.endpoint.model(),
    );

    let mut response = match extract_inner(request, &route, client)
        .instrument(request_span.clone())
        .await
    {
        Ok(response) => response,
        Err(err) => {
            request_span.in_scope(|| match err.status() {
                status if status.is_server_error() => {
                    warn!(status = %status.as_u16(), error = %err, "extraction failed")
                }
                status => info!(status = %status.as_u16(), error = %err, "request rejected"),
            });
            err.into_response()
        }
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn extract_inner<B>(
    request: Request<B>,
    route: &RouteDefinition,
    client: Arc<dyn CompletionClient>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, ExtractionError>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let body = request
        .into_body()
        .collect()
        .await
        .map_err(|err| ExtractionError::UnreadableBody(err.to_string()))?
        .to_bytes();

    let endpoint = &route.endpoint;
    let messages = prepare_messages(endpoint, &body)?;
    let model = endpoint.model();
    let target = endpoint.target();
    debug!(messages = messages.len(), "calling model");

    let response = match route.kind {
        RouteKind::Single => {
            let value = client.create(model, messages, target).await?;
            json_response(StatusCode::OK, &value)
        }
        RouteKind::List => {
            let values: Vec<Value> = client
                .create_iterable(model, messages, target, false)
                .await?
                .try_collect()
                .await?;
            debug!(count = values.len(), "collected instances");
            json_response(StatusCode::OK, &Value::Array(values))
        }
        RouteKind::ListStream => {
            let objects = client.create_iterable(model, messages, target, true).await?;
            create_event_stream_response(objects)
        }
        RouteKind::Stream => {
            let objects = client.create_partial(model, messages, target).await?;
            create_event_stream_response(objects)
        }
    };
    Ok(response)
}

/// Validates the payload against the input model and renders the prompt.
/// Nothing reaches the model-call client unless both succeed.
fn prepare_messages(
    endpoint: &CompiledEndpoint,
    body: &Bytes,
) -> Result<Vec<Message>, ExtractionError> {
    let payload: Value = serde_json::from_slice(body)?;
    let input = endpoint.input_model().instantiate(&payload)?;
    Ok(endpoint.renderer().render(&input)?)
}
