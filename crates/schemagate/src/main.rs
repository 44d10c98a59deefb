use std::sync::Arc;
use std::time::Duration;

use common::ConfigLoader;
use extractllm::{CompletionClient, OpenAiClient};
use schemagate::app_state::AppState;
use schemagate::compiler::compile;
use schemagate::server::run_server;
use schemagate::settings::ServerSettings;
use schemagate::utils::tracing::init_tracer;
use tracing::{info, warn};

const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = ServerSettings::from_env()?;
    let tracer_provider = init_tracer(&settings.tracing)?;

    info!(config_dir = %settings.config_dir.display(), "loading endpoint configs");
    let documents = ConfigLoader::new(&settings.config_dir).load_all()?;
    let routes = compile(documents)?;
    if routes.is_empty() {
        warn!(config_dir = %settings.config_dir.display(), "no configs found, serving no endpoints");
    }
    for route in routes.iter() {
        info!(
            path = %route.path,
            kind = %route.kind,
            model = %route.endpoint.model(),
            "registered route"
        );
    }

    if settings.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set, upstream requests are sent without credentials");
    }
    let http_client = reqwest::Client::builder()
        .connect_timeout(UPSTREAM_CONNECT_TIMEOUT)
        .build()?;
    let client: Arc<dyn CompletionClient> = Arc::new(OpenAiClient::with_http_client(
        http_client,
        settings.llm_provider_endpoint.clone(),
        settings.api_key.clone(),
    ));
    info!(endpoint = %settings.llm_provider_endpoint, "using model provider");

    let state = Arc::new(AppState::new(routes, client));
    let result = run_server(settings.bind_address, state).await;

    if let Err(err) = tracer_provider.shutdown() {
        warn!(error = %err, "failed to flush spans");
    }
    result
}
