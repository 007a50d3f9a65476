//! # Portico Server
//!
//! Listeners, protocol multiplexing and coordinated shutdown.
//!
//! - [`Multiplexer`] classifies each request on a shared port as native gRPC,
//!   gRPC-Web or REST and forwards it untouched
//! - [`RestRouter`] is the REST handler group with correlation ids and panic
//!   recovery
//! - [`Listener`] runs one accept loop through
//!   `Idle → Starting → Serving → Draining → Stopped`
//! - [`Orchestrator`] picks the topology, starts listeners and the telemetry
//!   drain, and bounds shutdown by one deadline
//! - [`TaskRegistry`] tracks every in-flight task the shutdown waits for
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use portico_config::PorticoConfig;
//! use portico_server::{Orchestrator, Services, ShutdownSignal};
//! use portico_telemetry::Telemetry;
//!
//! # async fn example() -> Result<(), portico_server::ServerError> {
//! let config = Arc::new(PorticoConfig::default());
//! let services = Services::from_config(&config);
//! let report = Orchestrator::new(config, services, Telemetry::disabled())
//!     .run(ShutdownSignal::with_os_signals())
//!     .await?;
//! assert!(report.is_graceful());
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/portico-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod listener;
mod mux;
mod orchestrator;
pub mod rest;
mod shutdown;
mod tasks;

pub use error::{ServerError, ServerResult};
pub use listener::{BoundListener, DrainOutcome, Listener, ListenerSignals, ListenerState};
pub use mux::{classify, is_native_rpc, Classification, Multiplexer, MultiplexerBuilder, Verbosity};
pub use orchestrator::{Orchestrator, Services, ShutdownReport, Started};
pub use rest::{PathParams, RestRouter, RestRouterBuilder};
pub use shutdown::ShutdownSignal;
pub use tasks::{TaskGuard, TaskRegistry};
