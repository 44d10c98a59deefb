use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_CONFIG_DIR: &str = "./configs";
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";
pub const DEFAULT_LLM_PROVIDER_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_OTEL_COLLECTOR_URL: &str = "http://localhost:4317";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{name}={value:?} is not a socket address: {reason}")]
    BindAddress {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{name}={value:?} must be an http(s) URL")]
    Endpoint { name: &'static str, value: String },
}

/// Process settings, read from the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub config_dir: PathBuf,
    pub bind_address: SocketAddr,
    pub llm_provider_endpoint: String,
    pub api_key: Option<String>,
    pub tracing: TracingSettings,
}

/// OpenTelemetry span export. Disabled unless `OTEL_TRACING_ENABLED=true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingSettings {
    pub enabled: bool,
    pub collector_url: String,
}

impl ServerSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config_dir = value("SCHEMAGATE_CONFIG_DIR")
            .unwrap_or_else(|| DEFAULT_CONFIG_DIR.to_string())
            .into();

        let bind = value("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        let bind_address = bind.parse().map_err(|err: std::net::AddrParseError| {
            SettingsError::BindAddress {
                name: "BIND_ADDRESS",
                value: bind.clone(),
                reason: err.to_string(),
            }
        })?;

        let endpoint = value("LLM_PROVIDER_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_LLM_PROVIDER_ENDPOINT.to_string());
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(SettingsError::Endpoint {
                name: "LLM_PROVIDER_ENDPOINT",
                value: endpoint,
            });
        }

        Ok(Self {
            config_dir,
            bind_address,
            llm_provider_endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: value("OPENAI_API_KEY"),
            tracing: TracingSettings {
                enabled: value("OTEL_TRACING_ENABLED")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(false),
                collector_url: value("OTEL_COLLECTOR_URL")
                    .unwrap_or_else(|| DEFAULT_OTEL_COLLECTOR_URL.to_string()),
            },
        })
    }
}
