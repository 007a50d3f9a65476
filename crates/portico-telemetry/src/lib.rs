//! Observability for Portico.
//!
//! - **Logging**: structured output through `tracing-subscriber`
//! - **Tracing**: OpenTelemetry spans exported over OTLP
//! - **Lifecycle**: a [`Telemetry`] handle drained under [`flush_budget`]
//!
//! # Example
//!
//! ```rust,ignore
//! use portico_telemetry::{init_logging, flush_budget, Telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::builder()
//!     .service_name("portico")
//!     .otlp_endpoint("http://localhost:4317")
//!     .build();
//!
//! init_logging(&config.logging)?;
//! let telemetry = Telemetry::start(&config)?;
//! // ... serve ...
//! telemetry.shutdown(flush_budget(Duration::from_secs(300))).await;
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod tracing;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use lifecycle::{flush_budget, FlushOutcome, Telemetry, MAX_FLUSH_BUDGET};
pub use logging::{init_logging, LogConfig};
pub use tracing::{extract_context, init_tracing, tracer, SpanExporterKind, TracingConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
