use std::sync::Arc;

use bytes::Bytes;
use extractllm::CompletionClient;

use crate::compiler::RouteTable;
use crate::handlers::openapi::openapi_document;

/// Shared, read-only state for every connection.
///
/// Built once before the listener binds; request handlers only clone the
/// `Arc`s they need.
pub struct AppState {
    pub routes: RouteTable,
    pub client: Arc<dyn CompletionClient>,
    /// Pre-rendered `GET /openapi.json` body.
    pub openapi: Bytes,
}

impl AppState {
    pub fn new(routes: RouteTable, client: Arc<dyn CompletionClient>) -> Self {
        let openapi = Bytes::from(openapi_document(&routes).to_string());
        Self {
            routes,
            client,
            openapi,
        }
    }
}
