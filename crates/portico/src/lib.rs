//! # Portico
//!
//! **REST, gRPC-Web and native gRPC on one port, with a bounded graceful shutdown.**
//!
//! - **One port or two** – equal REST and RPC ports select a single multiplexed
//!   listener; different ports run two independent listeners
//! - **Head-only classification** – requests are routed without touching the body
//! - **One deadline** – listeners, open connections and the telemetry flush all
//!   drain within the same shutdown budget
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use portico::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(ConfigLoader::new().with_defaults().with_service_env().load()?);
//!     let telemetry = Telemetry::start(&portico::telemetry_config(&config))?;
//!     let services = Services::from_config(&config);
//!
//!     let report = Orchestrator::new(config, services, telemetry)
//!         .run(ShutdownSignal::with_os_signals())
//!         .await?;
//!     println!("graceful: {}", report.is_graceful());
//!     Ok(())
//! }
//! ```
//!
//! ## Request flow
//!
//! ```text
//!              ┌─ HTTP/2 + application/grpc ─→ RpcDispatcher
//! Listener ─→ Multiplexer ─ gRPC-Web detector ─→ GrpcWebAdapter ─→ RpcDispatcher
//!              └─ otherwise ─────────────────→ RestRouter ─→ JSON envelope
//! ```

#![doc(html_root_url = "https://docs.rs/portico/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use portico_config::{LogFormat, PorticoConfig, TracingMode};
use portico_telemetry::{LogConfig, SpanExporterKind, TelemetryConfig, TracingConfig};

// Re-export core types
pub use portico_core as core;

// Re-export configuration
pub use portico_config as config;

// Re-export telemetry
pub use portico_telemetry as telemetry;

// Re-export RPC handling
pub use portico_rpc as rpc;

// Re-export listeners and lifecycle
pub use portico_server as server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use portico_config::{ConfigLoader, Overrides, PorticoConfig, Topology};
    pub use portico_core::{
        ApiError, CorrelationId, Envelope, Handler, HttpRequest, HttpResponse, RequestContext,
        WebRpcHandler,
    };
    pub use portico_rpc::{CallContext, RpcDispatcher, RpcService, RpcStatus};
    pub use portico_server::{
        Orchestrator, RestRouter, ServerError, Services, ShutdownReport, ShutdownSignal,
    };
    pub use portico_telemetry::Telemetry;
}

/// Logging settings for `config`, with development mode applied.
#[must_use]
pub fn log_config(config: &PorticoConfig) -> LogConfig {
    let logging = config.effective_logging();
    let mut log = match logging.format {
        LogFormat::Json => LogConfig::production(),
        LogFormat::Pretty => LogConfig::development(),
    };
    log.level = logging.level;
    log.service_name.clone_from(&config.telemetry.service_name);
    log
}

/// Exporter settings for `config`.
#[must_use]
pub fn telemetry_config(config: &PorticoConfig) -> TelemetryConfig {
    let section = &config.telemetry;
    let tracing = TracingConfig {
        enabled: section.tracing.mode == TracingMode::Stdout,
        exporter: SpanExporterKind::Stdout,
        sample_ratio: section.tracing.sampling_ratio,
        ..TracingConfig::default()
    };
    let mut builder = TelemetryConfig::builder()
        .service_name(&section.service_name)
        .service_version(env!("CARGO_PKG_VERSION"))
        .environment(&section.environment)
        .tracing(tracing)
        .logging(log_config(config));
    if let (TracingMode::Otlp, Some(endpoint)) =
        (section.tracing.mode, section.tracing.otlp_endpoint.as_deref())
    {
        builder = builder.otlp_endpoint(endpoint);
    }
    builder.build()
}
