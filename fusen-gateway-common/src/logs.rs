use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter,
};

pub const TRACER_NAME: &str = "fusen-gateway";

/// Gives every tracing span an OpenTelemetry span context so outbound calls
/// carry a `traceparent`. No exporter is installed.
pub fn trace_layer<S>() -> OpenTelemetryLayer<S, Tracer>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let provider = TracerProvider::builder().build();
    tracing_opentelemetry::layer().with_tracer(provider.tracer(TRACER_NAME))
}

/// Installs the global subscriber: fmt output plus [`trace_layer`].
/// `RUST_LOG` overrides the default `info` level.
pub fn init_log() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_line_number(true).with_thread_ids(true))
        .with(trace_layer())
        .try_init();
}
