//! Main configuration types.
//!
//! This module provides the top-level [`PorticoConfig`] struct and the
//! [`Topology`] derived from it.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, LogFormat, LoggingSection, ServerSection, TelemetrySection, TracingMode};

/// Budgets below this are flagged outside development mode.
pub const MIN_PRODUCTION_SHUTDOWN_SECS: u64 = 120;

/// Largest accepted shutdown budget (one day).
pub const MAX_SHUTDOWN_TIMEOUT_SECS: u64 = 86_400;

/// Complete Portico configuration.
///
/// Constructed once at process start by [`ConfigLoader`](crate::ConfigLoader)
/// and shared read-only afterwards.
///
/// # Example
///
/// ```
/// use portico_config::{PorticoConfig, Topology};
///
/// let config = PorticoConfig::default();
/// assert_eq!(
///     config.topology(),
///     Topology::Split { rest_port: 8080, rpc_port: 9000 }
/// );
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct PorticoConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerSection,

    /// Telemetry configuration (tracing, logging).
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

/// Listener layout, derived from the two configured ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// One listener classifying REST, gRPC-Web and native gRPC traffic.
    Multiplexed {
        /// The shared port.
        port: u16,
    },
    /// Two independent listeners.
    Split {
        /// Port serving REST.
        rest_port: u16,
        /// Port serving native gRPC.
        rpc_port: u16,
    },
}

impl PorticoConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The host is not an IP address
    /// - The shutdown budget is zero or above [`MAX_SHUTDOWN_TIMEOUT_SECS`]
    /// - The request timeout is zero
    /// - The message limit is zero or does not fit a gRPC frame length
    /// - The sampling ratio is not in 0.0..=1.0
    /// - OTLP tracing is selected without an endpoint
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.parse::<IpAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.host",
                format!("invalid IP address: {}", self.server.host),
            ));
        }

        if !(1..=MAX_SHUTDOWN_TIMEOUT_SECS).contains(&self.server.shutdown_timeout_secs) {
            return Err(ConfigError::invalid_value(
                "server.shutdown_timeout_secs",
                format!("must be between 1 and {MAX_SHUTDOWN_TIMEOUT_SECS}"),
            ));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "server.request_timeout_secs",
                "must be greater than 0",
            ));
        }

        if self.server.max_message_bytes == 0
            || u32::try_from(self.server.max_message_bytes).is_err()
        {
            return Err(ConfigError::invalid_value(
                "server.max_message_bytes",
                "must be between 1 and 4294967295",
            ));
        }

        if !(0.0..=1.0).contains(&self.telemetry.tracing.sampling_ratio) {
            return Err(ConfigError::invalid_value(
                "telemetry.tracing.sampling_ratio",
                "must be between 0.0 and 1.0",
            ));
        }

        if self.telemetry.tracing.mode == TracingMode::Otlp
            && self
                .telemetry
                .tracing
                .otlp_endpoint
                .as_deref()
                .map_or(true, str::is_empty)
        {
            return Err(ConfigError::validation_error(
                "telemetry.tracing.otlp_endpoint must be set when mode is 'otlp'",
            ));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.server.development = true;
        config.telemetry.environment = "development".to_string();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config
    }

    /// Listener layout for this configuration.
    #[must_use]
    pub fn topology(&self) -> Topology {
        if self.server.http_port == self.server.grpc_port {
            Topology::Multiplexed {
                port: self.server.http_port,
            }
        } else {
            Topology::Split {
                rest_port: self.server.http_port,
                rpc_port: self.server.grpc_port,
            }
        }
    }

    /// The bind address for `port` on the configured host.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the host is not an IP address.
    pub fn bind_addr(&self, port: u16) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.server.host.parse().map_err(|_| {
            ConfigError::invalid_value(
                "server.host",
                format!("invalid IP address: {}", self.server.host),
            )
        })?;
        Ok(SocketAddr::new(ip, port))
    }

    /// Total shutdown budget.
    #[must_use]
    pub fn shutdown_budget(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Per-request REST timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Logging settings with development mode applied.
    ///
    /// Development mode switches to pretty output and lowers the default
    /// `info` level to `debug`.
    #[must_use]
    pub fn effective_logging(&self) -> LoggingSection {
        let mut logging = self.telemetry.logging.clone();
        if self.server.development {
            logging.format = LogFormat::Pretty;
            if logging.level.eq_ignore_ascii_case("info") {
                logging.level = "debug".to_string();
            }
        }
        logging
    }

    /// Suspicious but valid settings worth logging at startup.
    #[must_use]
    pub fn sanity_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.server.development
            && self.server.shutdown_timeout_secs < MIN_PRODUCTION_SHUTDOWN_SECS
        {
            warnings.push(format!(
                "shutdown timeout of {}s is low for production; in-flight requests may be \
                 abandoned (recommended at least {MIN_PRODUCTION_SHUTDOWN_SECS}s)",
                self.server.shutdown_timeout_secs
            ));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        PorticoConfig::default().validate().unwrap();
    }

    #[test]
    fn test_topology_split() {
        let config = PorticoConfig::default();
        assert_eq!(
            config.topology(),
            Topology::Split {
                rest_port: 8080,
                rpc_port: 9000
            }
        );
    }

    #[test]
    fn test_topology_multiplexed() {
        let mut config = PorticoConfig::default();
        config.server.grpc_port = 8080;
        assert_eq!(config.topology(), Topology::Multiplexed { port: 8080 });
    }

    #[test]
    fn test_validate_rejects_bad_host() {
        let mut config = PorticoConfig::default();
        config.server.host = "not-an-ip".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut config = PorticoConfig::default();
        config.server.shutdown_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_budget() {
        let mut config = PorticoConfig::default();
        config.server.shutdown_timeout_secs = u64::MAX;
        assert!(config.validate().is_err());

        config.server.shutdown_timeout_secs = MAX_SHUTDOWN_TIMEOUT_SECS;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_request_timeout() {
        let mut config = PorticoConfig::default();
        config.server.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_otlp_without_endpoint() {
        let mut config = PorticoConfig::default();
        config.telemetry.tracing.mode = TracingMode::Otlp;
        assert!(config.validate().is_err());

        config.telemetry.tracing.otlp_endpoint = Some("http://jaeger:4317".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_sampling_ratio() {
        let mut config = PorticoConfig::default();
        config.telemetry.tracing.sampling_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bind_addr() {
        let mut config = PorticoConfig::default();
        config.server.host = "127.0.0.1".to_string();
        assert_eq!(
            config.bind_addr(8080).unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_sanity_warning_for_low_production_budget() {
        let mut config = PorticoConfig::default();
        config.server.shutdown_timeout_secs = 60;
        assert_eq!(config.sanity_warnings().len(), 1);

        config.server.development = true;
        assert!(config.sanity_warnings().is_empty());
    }

    #[test]
    fn test_default_budget_has_no_warning() {
        assert!(PorticoConfig::default().sanity_warnings().is_empty());
    }

    #[test]
    fn test_effective_logging_in_development() {
        let mut config = PorticoConfig::default();
        config.server.development = true;
        let logging = config.effective_logging();
        assert_eq!(logging.level, "debug");
        assert_eq!(logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_effective_logging_keeps_explicit_level() {
        let mut config = PorticoConfig::default();
        config.server.development = true;
        config.telemetry.logging.level = "warn".to_string();
        assert_eq!(config.effective_logging().level, "warn");
    }

    #[test]
    fn test_development_preset() {
        let config = PorticoConfig::development();
        assert!(config.server.development);
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    }
}
