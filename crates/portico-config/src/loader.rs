//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! defaults, files, environment variables and command-line overrides.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, LogFormat, PorticoConfig, TracingMode};

/// Unprefixed variables understood for compatibility with existing deployments.
pub const SERVICE_ENV_VARS: [&str; 6] = [
    "HTTP_PORT",
    "GRPC_PORT",
    "SHUTDOWN_TIMEOUT",
    "ENVIRONMENT",
    "JAEGER_ENDPOINT",
    "INGRESS_PREFIX",
];

/// Values supplied on the command line. `None` leaves the loaded value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Shutdown budget in seconds.
    pub shutdown_timeout_secs: Option<u64>,
    /// REST port.
    pub http_port: Option<u16>,
    /// RPC port.
    pub grpc_port: Option<u16>,
    /// Development mode.
    pub development: Option<bool>,
    /// `disabled` or an OTLP endpoint.
    pub telemetry: Option<String>,
}

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Unprefixed service variables (`HTTP_PORT`, `SHUTDOWN_TIMEOUT`, ...)
/// 4. Prefixed variables (`PREFIX__SECTION__KEY`)
/// 5. Command-line overrides
///
/// # Example
///
/// ```no_run
/// use portico_config::ConfigLoader;
///
/// # fn main() -> Result<(), portico_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_optional_file("portico.toml")?
///     .with_service_env()
///     .with_env_prefix("PORTICO")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: PorticoConfig,
    service_env: bool,
    env_prefix: Option<String>,
    overrides: Overrides,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PorticoConfig::default(),
            service_env: false,
            env_prefix: None,
            overrides: Overrides::default(),
        }
    }

    /// Start with default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = PorticoConfig::default();
        self
    }

    /// Start with the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = PorticoConfig::development();
        self
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json), chosen by extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed or
    /// contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `toml` or `json` format.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use portico_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\ngrpc_port = 8080", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.grpc_port, 8080);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Honour the unprefixed service variables listed in [`SERVICE_ENV_VARS`].
    #[must_use]
    pub fn with_service_env(mut self) -> Self {
        self.service_env = true;
        self
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, for example
    /// `PORTICO__SERVER__HTTP_PORT=8080`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if one exists.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        let _ = dotenvy::dotenv();
        self
    }

    /// Apply command-line overrides last.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Finalize and return the validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an environment variable cannot be parsed or
    /// the final configuration is invalid.
    pub fn load(self) -> Result<PorticoConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply every layer without validating the result.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an environment variable cannot be parsed.
    pub fn load_unvalidated(mut self) -> Result<PorticoConfig, ConfigError> {
        if self.service_env {
            for name in SERVICE_ENV_VARS {
                if let Ok(value) = env::var(name) {
                    self.apply_service_var(name, &value)?;
                }
            }
        }

        if let Some(prefix) = self.env_prefix.take() {
            let env_vars: HashMap<String, String> = env::vars()
                .filter(|(k, _)| k.starts_with(&prefix))
                .collect();
            for (key, value) in env_vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }

        let overrides = std::mem::take(&mut self.overrides);
        self.apply_overrides(overrides);

        Ok(self.config)
    }

    fn parse_file(content: &str, path: &Path) -> Result<PorticoConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_service_var(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "HTTP_PORT" => self.config.server.http_port = parse_port(key, value)?,
            "GRPC_PORT" => self.config.server.grpc_port = parse_port(key, value)?,
            "SHUTDOWN_TIMEOUT" => {
                self.config.server.shutdown_timeout_secs = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }
            "ENVIRONMENT" => self.config.telemetry.environment = value.to_string(),
            "JAEGER_ENDPOINT" => self.set_telemetry(value),
            "INGRESS_PREFIX" => self.config.server.ingress_prefix = value.to_string(),
            _ => {}
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();

        match parts.as_slice() {
            // Server section
            ["SERVER", "HOST"] => {
                self.config.server.host = value.to_string();
            }
            ["SERVER", "HTTP_PORT"] => {
                self.config.server.http_port = parse_port(key, value)?;
            }
            ["SERVER", "GRPC_PORT"] => {
                self.config.server.grpc_port = parse_port(key, value)?;
            }
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                self.config.server.shutdown_timeout_secs = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }
            ["SERVER", "DEVELOPMENT"] => {
                self.config.server.development = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["SERVER", "INGRESS_PREFIX"] => {
                self.config.server.ingress_prefix = value.to_string();
            }
            ["SERVER", "MAX_MESSAGE_BYTES"] => {
                self.config.server.max_message_bytes = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }
            ["SERVER", "REQUEST_TIMEOUT_SECS"] => {
                self.config.server.request_timeout_secs = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }

            // Telemetry section
            ["TELEMETRY", "SERVICE_NAME"] => {
                self.config.telemetry.service_name = value.to_string();
            }
            ["TELEMETRY", "ENVIRONMENT"] => {
                self.config.telemetry.environment = value.to_string();
            }

            // Telemetry tracing
            ["TELEMETRY", "TRACING", "MODE"] => {
                self.config.telemetry.tracing.mode = match value.to_lowercase().as_str() {
                    "disabled" => TracingMode::Disabled,
                    "otlp" => TracingMode::Otlp,
                    "stdout" => TracingMode::Stdout,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'disabled', 'otlp' or 'stdout'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "TRACING", "OTLP_ENDPOINT"] => {
                self.config.telemetry.tracing.otlp_endpoint = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            ["TELEMETRY", "TRACING", "SAMPLING_RATIO"] => {
                self.config.telemetry.tracing.sampling_ratio = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected float"))?;
            }

            // Telemetry logging
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                self.config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                self.config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }

            _ => {}
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(secs) = overrides.shutdown_timeout_secs {
            self.config.server.shutdown_timeout_secs = secs;
        }
        if let Some(port) = overrides.http_port {
            self.config.server.http_port = port;
        }
        if let Some(port) = overrides.grpc_port {
            self.config.server.grpc_port = port;
        }
        if let Some(development) = overrides.development {
            self.config.server.development = development;
        }
        if let Some(telemetry) = overrides.telemetry {
            self.set_telemetry(&telemetry);
        }
    }

    // An empty value or "disabled" turns the exporter off, "stdout" and "local"
    // print spans; anything else is an OTLP endpoint.
    fn set_telemetry(&mut self, value: &str) {
        let tracing = &mut self.config.telemetry.tracing;
        if value.is_empty() || value.eq_ignore_ascii_case("disabled") {
            tracing.mode = TracingMode::Disabled;
        } else if value.eq_ignore_ascii_case("stdout") || value.eq_ignore_ascii_case("local") {
            tracing.mode = TracingMode::Stdout;
        } else {
            tracing.mode = TracingMode::Otlp;
            tracing.otlp_endpoint = Some(value.to_string());
        }
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected port number"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
