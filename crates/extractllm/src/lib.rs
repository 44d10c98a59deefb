//! Model-call abstraction for structured extraction.
//!
//! A [`CompletionClient`] sends chat messages to a language model and parses
//! the reply into instances of a [`TargetSchema`]: one instance, a sequence of
//! instances, or a sequence of progressively more complete partial instances.

pub mod accumulate;
pub mod apis;
pub mod client;
pub mod error;
pub mod json;
pub mod openai;
pub mod schema;

#[cfg(test)]
mod testing;

pub use apis::openai::Message;
pub use client::{CompletionClient, ObjectStream};
pub use error::ClientError;
pub use openai::OpenAiClient;
pub use schema::{SchemaMismatch, TargetSchema};
