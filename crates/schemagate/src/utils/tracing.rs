use std::fmt;

use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace::SdkTracerProvider, Resource};
use thiserror::Error;
use time::macros::format_description;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{format, time::FormatTime, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::settings::TracingSettings;

const SERVICE_NAME: &str = "schemagate";

#[derive(Debug, Error)]
pub enum TracerError {
    #[error("failed to create OTLP span exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),

    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

struct BracketedTime;

impl FormatTime for BracketedTime {
    fn format_time(&self, w: &mut format::Writer<'_>) -> fmt::Result {
        let now = time::OffsetDateTime::now_utc();
        let formatted = now
            .format(&format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
            ))
            .map_err(|_| fmt::Error)?;
        write!(w, "[{formatted}]")
    }
}

/// `[2025-01-01 12:00:00.000][info] message key=value`
struct BracketedFormatter;

impl<S, N> FormatEvent<S, N> for BracketedFormatter
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        BracketedTime.format_time(&mut writer)?;

        write!(
            writer,
            "[{}] ",
            event.metadata().level().to_string().to_lowercase()
        )?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. With export enabled, spans are also sent
/// to the OTLP collector; the returned provider must be kept alive and shut
/// down on exit to flush them.
pub fn init_tracer(settings: &TracingSettings) -> Result<SdkTracerProvider, TracerError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    if !settings.enabled {
        let provider = SdkTracerProvider::builder().build();
        global::set_tracer_provider(provider.clone());

        tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer().event_format(BracketedFormatter))
            .try_init()?;
        return Ok(provider);
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&settings.collector_url)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
        .with_batch_exporter(exporter)
        .build();
    global::set_tracer_provider(provider.clone());

    let telemetry_layer =
        tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME));

    tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().event_format(BracketedFormatter))
        .try_init()?;

    Ok(provider)
}
