use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use opentelemetry::global;
use opentelemetry::trace::FutureExt;
use opentelemetry_http::HeaderExtractor;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::handlers::errors::ExtractionError;
use crate::handlers::extract::extract;
use crate::handlers::full;
use crate::handlers::openapi::OPENAPI_PATH;

/// Route an incoming HTTP request to the appropriate handler.
pub async fn route<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let parent_cx = global::get_text_map_propagator(|p| p.extract(&HeaderExtractor(req.headers())));
    let path = req.uri().path().to_string();

    if path == OPENAPI_PATH && req.method() == Method::GET {
        let mut response = Response::new(full(state.openapi.clone()));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        return Ok(response);
    }

    let Some(definition) = state.routes.get(&path) else {
        debug!(method = %req.method(), path = %path, "no route found");
        return Ok(ExtractionError::NotFound(path).into_response());
    };

    if req.method() != Method::POST {
        return Ok(ExtractionError::MethodNotAllowed {
            method: req.method().to_string(),
            path,
        }
        .into_response());
    }

    Ok(extract(req, definition.clone(), Arc::clone(&state.client))
        .with_context(parent_cx)
        .await)
}

/// Accept connections and spawn a task per connection.
///
/// Listens for `SIGINT` / `ctrl-c` and shuts down gracefully, allowing
/// in-flight connections to finish.
pub async fn run_server(
    bind_address: SocketAddr,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(bind_address).await?;
    info!(address = %bind_address, "server listening");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = result?;
                let io = TokioIo::new(stream);
                let state = Arc::clone(&state);

                tokio::task::spawn(async move {
                    debug!(peer = ?peer_addr, "accepted connection");

                    let service = service_fn(move |req: Request<Incoming>| {
                        let state = Arc::clone(&state);
                        async move { route(req, state).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        warn!(error = ?err, "error serving connection");
                    }
                });
            }
            _ = &mut shutdown => {
                info!("received shutdown signal, stopping server");
                break;
            }
        }
    }

    Ok(())
}
