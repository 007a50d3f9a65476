//! Configuration schema types.
//!
//! This module defines the structure of every configuration section.

use serde::{Deserialize, Serialize};

/// Server configuration section.
///
/// Ports, shutdown budget and request limits for the listeners.
///
/// # Example
///
/// ```
/// use portico_config::ServerSection;
///
/// let server = ServerSection {
///     http_port: 8080,
///     grpc_port: 8080,
///     ..ServerSection::default()
/// };
/// assert_eq!(server.shutdown_timeout_secs, 300);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Interface the listeners bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// REST port.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// RPC port. Equal to `http_port` selects the multiplexed topology.
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,

    /// Total time from cancellation signal to forced exit, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Development mode: verbose multiplexer, pretty logs, error details in envelopes.
    #[serde(default)]
    pub development: bool,

    /// Path prefix added in front of every REST route (e.g. `/api`).
    #[serde(default)]
    pub ingress_prefix: String,

    /// Largest accepted RPC message, in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Per-request timeout applied to REST handlers, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            grpc_port: default_grpc_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            development: false,
            ingress_prefix: String::new(),
            max_message_bytes: default_max_message_bytes(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_grpc_port() -> u16 {
    9000
}

fn default_shutdown_timeout() -> u64 {
    300
}

fn default_max_message_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_request_timeout() -> u64 {
    30
}

/// How spans leave the process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TracingMode {
    /// No exporter; spans are only visible as log context.
    #[default]
    Disabled,
    /// Batch export to an OTLP collector.
    Otlp,
    /// Print spans to standard output.
    Stdout,
}

/// Tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TracingSection {
    /// Exporter selection.
    #[serde(default)]
    pub mode: TracingMode,

    /// OTLP exporter endpoint (e.g., `http://localhost:4317`).
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Sampling ratio (0.0 to 1.0). 1.0 means sample all traces.
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

impl Default for TracingSection {
    fn default() -> Self {
        Self {
            mode: TracingMode::Disabled,
            otlp_endpoint: None,
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

fn default_sampling_ratio() -> f64 {
    1.0
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Json,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Service name attached to spans and logs.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Deployment environment (local, staging, production).
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Tracing settings.
    #[serde(default)]
    pub tracing: TracingSection,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            tracing: TracingSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

fn default_service_name() -> String {
    "portico".to_string()
}

fn default_environment() -> String {
    "local".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let server = ServerSection::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.http_port, 8080);
        assert_eq!(server.grpc_port, 9000);
        assert_eq!(server.shutdown_timeout_secs, 300);
        assert_eq!(server.max_message_bytes, 4 * 1024 * 1024);
        assert!(!server.development);
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let server: ServerSection = toml::from_str("http_port = 7000").unwrap();
        assert_eq!(server.http_port, 7000);
        assert_eq!(server.grpc_port, 9000);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<ServerSection, _> = toml::from_str("http_addr = \"x\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_tracing_mode_serde() {
        let tracing: TracingSection = toml::from_str("mode = \"otlp\"").unwrap();
        assert_eq!(tracing.mode, TracingMode::Otlp);
    }
}
