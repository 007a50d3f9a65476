//! Typed configuration for Portico.
//!
//! - TOML and JSON configuration files
//! - The service's unprefixed environment variables (`HTTP_PORT`, `GRPC_PORT`,
//!   `SHUTDOWN_TIMEOUT`, `ENVIRONMENT`, `JAEGER_ENDPOINT`, `INGRESS_PREFIX`)
//! - Prefixed overrides (`PORTICO__SECTION__KEY`)
//! - Command-line [`Overrides`]
//! - Strict validation (fails on unknown fields)
//!
//! The result is a [`PorticoConfig`] built once at startup. Its
//! [`topology`](PorticoConfig::topology) decides whether REST and RPC share a
//! multiplexed port.
//!
//! # Example
//!
//! ```no_run
//! use portico_config::ConfigLoader;
//!
//! # fn main() -> Result<(), portico_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()
//!     .with_optional_file("portico.toml")?
//!     .with_service_env()
//!     .with_env_prefix("PORTICO")
//!     .load()?;
//!
//! println!("{:?}", config.topology());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! http_port = 8080
//! grpc_port = 9000
//! shutdown_timeout_secs = 300
//! development = false
//! ingress_prefix = ""
//!
//! [telemetry]
//! service_name = "portico"
//! environment = "production"
//!
//! [telemetry.tracing]
//! mode = "otlp"
//! otlp_endpoint = "http://localhost:4317"
//! sampling_ratio = 1.0
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//! ```

#![doc(html_root_url = "https://docs.rs/portico-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{
    PorticoConfig, Topology, MAX_SHUTDOWN_TIMEOUT_SECS, MIN_PRODUCTION_SHUTDOWN_SECS,
};
pub use error::ConfigError;
pub use loader::{ConfigLoader, Overrides, SERVICE_ENV_VARS};
pub use schema::{
    LogFormat, LoggingSection, ServerSection, TelemetrySection, TracingMode, TracingSection,
};
