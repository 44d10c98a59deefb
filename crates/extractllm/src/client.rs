use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::apis::openai::Message;
use crate::error::Result;
use crate::schema::TargetSchema;

/// Lazily produced instances of a target schema.
pub type ObjectStream = BoxStream<'static, Result<Value>>;

/// Sends chat messages to a model and parses the reply into `target`.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// One complete, validated instance.
    async fn create(
        &self,
        model: &str,
        messages: Vec<Message>,
        target: Arc<dyn TargetSchema>,
    ) -> Result<Value>;

    /// A sequence of validated instances. With `stream` set, instances are
    /// yielded as the model produces them; otherwise the whole reply is
    /// awaited first.
    async fn create_iterable(
        &self,
        model: &str,
        messages: Vec<Message>,
        target: Arc<dyn TargetSchema>,
        stream: bool,
    ) -> Result<ObjectStream>;

    /// Progressively more complete instances while the reply streams in.
    async fn create_partial(
        &self,
        model: &str,
        messages: Vec<Message>,
        target: Arc<dyn TargetSchema>,
    ) -> Result<ObjectStream>;
}
