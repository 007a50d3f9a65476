//! OpenTelemetry distributed tracing.
//!
//! Spans are batch-exported over OTLP/gRPC. Inbound W3C trace context is
//! extracted with [`extract_context`] so request spans join the caller's trace.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, TracerProvider};
use opentelemetry_sdk::Resource;

/// Where exported spans go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpanExporterKind {
    /// Batch export to an OTLP collector over gRPC.
    #[default]
    Otlp,
    /// Pretty-printed to standard output as each span ends.
    Stdout,
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether spans are exported.
    pub enabled: bool,

    /// Exporter used when enabled.
    pub exporter: SpanExporterKind,

    /// OTLP endpoint (e.g., `http://localhost:4317`).
    pub otlp_endpoint: String,

    /// Service name for spans.
    pub service_name: String,

    /// Service version.
    pub service_version: String,

    /// Deployment environment.
    pub environment: String,

    /// Sampling ratio (0.0 to 1.0).
    pub sample_ratio: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            exporter: SpanExporterKind::Otlp,
            otlp_endpoint: "http://localhost:4317".to_string(),
            service_name: "portico".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "local".to_string(),
            sample_ratio: 1.0,
        }
    }
}

/// Initializes the tracer provider and installs it globally.
///
/// Returns `None` when export is disabled.
///
/// # Errors
///
/// Returns `TelemetryError::TracingInit` if the exporter cannot be built.
pub fn init_tracing(config: &TracingConfig) -> TelemetryResult<Option<TracerProvider>> {
    if !config.enabled {
        return Ok(None);
    }

    if config.exporter == SpanExporterKind::Otlp && config.otlp_endpoint.is_empty() {
        return Err(TelemetryError::InvalidConfig(
            "OTLP endpoint must not be empty".to_string(),
        ));
    }

    let resource = Resource::new([
        KeyValue::new(
            opentelemetry_semantic_conventions::attribute::SERVICE_NAME,
            config.service_name.clone(),
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::attribute::SERVICE_VERSION,
            config.service_version.clone(),
        ),
        KeyValue::new("deployment.environment", config.environment.clone()),
    ]);

    let sampler = if config.sample_ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if config.sample_ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(config.sample_ratio)
    };

    let builder = match config.exporter {
        SpanExporterKind::Otlp => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(&config.otlp_endpoint)
                .build()
                .map_err(|e| TelemetryError::TracingInit(e.to_string()))?;
            TracerProvider::builder()
                .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        }
        SpanExporterKind::Stdout => TracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default()),
    };

    let provider = builder
        .with_sampler(sampler)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    global::set_text_map_propagator(TraceContextPropagator::new());
    global::set_tracer_provider(provider.clone());

    Ok(Some(provider))
}

/// Returns a tracer from the global provider.
///
/// Spans from this tracer are dropped when export is disabled.
#[must_use]
pub fn tracer(name: &'static str) -> global::BoxedTracer {
    global::tracer(name)
}

/// Extracts trace context from inbound HTTP headers.
pub fn extract_context(headers: &http::HeaderMap) -> opentelemetry::Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// HTTP header extractor for `http::HeaderMap`.
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl opentelemetry::propagation::Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(http::HeaderName::as_str).collect()
    }
}
