//! Telemetry configuration.

use crate::logging::LogConfig;
use crate::tracing::{SpanExporterKind, TracingConfig};

/// Configuration for all telemetry subsystems.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name (used in traces and logs).
    pub service_name: String,

    /// Service version.
    pub service_version: String,

    /// Environment (production, staging, development).
    pub environment: String,

    /// Tracing configuration.
    pub tracing: TracingConfig,

    /// Logging configuration.
    pub logging: LogConfig,
}

impl TelemetryConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::new()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "portico".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "local".to_string(),
            tracing: TracingConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    service_version: Option<String>,
    environment: Option<String>,
    tracing: Option<TracingConfig>,
    logging: Option<LogConfig>,
}

impl TelemetryConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service name.
    #[must_use]
    pub fn service_name(mut self, name: &str) -> Self {
        self.service_name = Some(name.to_string());
        self
    }

    /// Sets the service version.
    #[must_use]
    pub fn service_version(mut self, version: &str) -> Self {
        self.service_version = Some(version.to_string());
        self
    }

    /// Sets the environment.
    #[must_use]
    pub fn environment(mut self, env: &str) -> Self {
        self.environment = Some(env.to_string());
        self
    }

    /// Sets the tracing configuration.
    #[must_use]
    pub fn tracing(mut self, config: TracingConfig) -> Self {
        self.tracing = Some(config);
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn logging(mut self, config: LogConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Enables OTLP export to `endpoint`.
    #[must_use]
    pub fn otlp_endpoint(mut self, endpoint: &str) -> Self {
        let config = self.tracing.take().unwrap_or_default();
        self.tracing = Some(TracingConfig {
            enabled: true,
            exporter: SpanExporterKind::Otlp,
            otlp_endpoint: endpoint.to_string(),
            ..config
        });
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        let defaults = TelemetryConfig::default();

        let service_name = self.service_name.unwrap_or(defaults.service_name);
        let service_version = self.service_version.unwrap_or(defaults.service_version);
        let environment = self.environment.unwrap_or(defaults.environment);

        let mut tracing = self.tracing.unwrap_or(defaults.tracing);
        tracing.service_name = service_name.clone();
        tracing.service_version = service_version.clone();
        tracing.environment = environment.clone();

        let mut logging = self.logging.unwrap_or(defaults.logging);
        logging.service_name = service_name.clone();

        TelemetryConfig {
            service_name,
            service_version,
            environment,
            tracing,
            logging,
        }
    }
}
