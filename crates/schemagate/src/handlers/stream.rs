use bytes::Bytes;
use extractllm::ObjectStream;
use futures::StreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use hyper::Response;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn, Instrument};

/// Events buffered between the model stream and the response body.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

/// How a pump run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    Completed { emitted: usize },
    Failed { emitted: usize },
    Disconnected { emitted: usize },
}

/// `data: <json>\n\n`
pub fn encode_event(value: &Value) -> Bytes {
    Bytes::from(format!("data: {value}\n\n"))
}

/// Serves `objects` as a server-sent event stream. A background task pumps
/// objects into a bounded channel that feeds the response body.
pub fn create_event_stream_response(objects: ObjectStream) -> Response<BoxBody<Bytes, hyper::Error>> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(pump(objects, tx).in_current_span());

    let frames = ReceiverStream::new(rx).map(|chunk: Bytes| Ok::<_, hyper::Error>(Frame::data(chunk)));
    let mut response = Response::new(BodyExt::boxed(StreamBody::new(frames)));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/// Forwards every object as one event until the stream ends, fails, or the
/// receiving side goes away. A failure closes the stream after the events
/// already sent.
pub async fn pump(mut objects: ObjectStream, tx: mpsc::Sender<Bytes>) -> PumpOutcome {
    let mut emitted = 0;
    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                debug!(emitted, "client disconnected, stopping event stream");
                return PumpOutcome::Disconnected { emitted };
            }
            next = objects.next() => next,
        };

        match next {
            None => {
                debug!(emitted, "event stream completed");
                return PumpOutcome::Completed { emitted };
            }
            Some(Ok(value)) => {
                if tx.send(encode_event(&value)).await.is_err() {
                    debug!(emitted, "client disconnected, stopping event stream");
                    return PumpOutcome::Disconnected { emitted };
                }
                emitted += 1;
            }
            Some(Err(err)) => {
                warn!(error = %err, emitted, "model stream failed, closing event stream");
                return PumpOutcome::Failed { emitted };
            }
        }
    }
}
