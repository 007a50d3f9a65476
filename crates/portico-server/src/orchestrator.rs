//! Topology selection and shutdown ordering.
//!
//! The orchestrator binds every listener before serving anything, so a bind
//! failure aborts startup with nothing half-started. Once serving it waits for
//! the cancellation signal, then:
//!
//! 1. every listener and the telemetry drain observe the signal concurrently
//! 2. the [`TaskRegistry`] is awaited until empty or until the shared deadline
//!    (`signal + budget`) passes
//! 3. on deadline, the force signal aborts whatever connections remain
//!
//! Telemetry flushes within [`flush_budget`], carved from the same budget and
//! running alongside the listener drain.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use portico_config::{PorticoConfig, Topology};
use portico_core::{Handler, WebRpcHandler};
use portico_rpc::{Greeter, GrpcWebAdapter, RpcDispatcher};
use portico_telemetry::{flush_budget, FlushOutcome, Telemetry};
use tokio::time::Instant;

use crate::error::{ServerError, ServerResult};
use crate::listener::{BoundListener, DrainOutcome, Listener, ListenerSignals};
use crate::mux::{Multiplexer, Verbosity};
use crate::rest::RestRouter;
use crate::shutdown::ShutdownSignal;
use crate::tasks::TaskRegistry;

/// The three handlers a process serves.
#[derive(Clone)]
pub struct Services {
    /// REST handler group.
    pub rest: Arc<dyn Handler>,
    /// gRPC-Web adapter and detector.
    pub web: Arc<dyn WebRpcHandler>,
    /// Native gRPC dispatcher.
    pub rpc: Arc<dyn Handler>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

impl Services {
    /// The bundled services: `GET /v1/` and `helloworld.Greeter`.
    #[must_use]
    pub fn from_config(config: &PorticoConfig) -> Self {
        let dispatcher = Arc::new(
            RpcDispatcher::builder()
                .service(Greeter::new())
                .max_message_bytes(config.server.max_message_bytes)
                .build(),
        );
        Self {
            rest: Arc::new(RestRouter::service(
                &config.server.ingress_prefix,
                config.server.development,
                config.request_timeout(),
            )),
            web: Arc::new(GrpcWebAdapter::new(Arc::clone(&dispatcher))),
            rpc: dispatcher,
        }
    }
}

/// Summary of one shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Combined outcome of every listener.
    pub listeners: DrainOutcome,
    /// Telemetry drain result; `None` if it was cut off by the deadline.
    pub telemetry: Option<FlushOutcome>,
    /// Time from cancellation to the end of the shutdown.
    pub elapsed: Duration,
    /// Tasks still registered when the deadline passed.
    pub abandoned_tasks: Vec<String>,
}

impl ShutdownReport {
    /// Returns `true` if everything drained before the deadline.
    #[must_use]
    pub fn is_graceful(&self) -> bool {
        self.listeners.is_graceful() && self.abandoned_tasks.is_empty()
    }
}

/// Builds listeners from configuration and owns their lifecycle.
#[derive(Debug)]
pub struct Orchestrator {
    config: Arc<PorticoConfig>,
    services: Services,
    telemetry: Telemetry,
    registry: TaskRegistry,
}

impl Orchestrator {
    /// Creates an orchestrator; nothing is bound yet.
    pub fn new(config: Arc<PorticoConfig>, services: Services, telemetry: Telemetry) -> Self {
        Self {
            config,
            services,
            telemetry,
            registry: TaskRegistry::new(),
        }
    }

    /// The registry shared by every task this orchestrator starts.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    fn listeners(&self) -> ServerResult<Vec<Listener>> {
        let services = &self.services;
        let listeners = match self.config.topology() {
            Topology::Multiplexed { port } => {
                let mux = Multiplexer::builder()
                    .rpc(Arc::clone(&services.rpc))
                    .web(Arc::clone(&services.web))
                    .rest(Arc::clone(&services.rest))
                    .verbosity(Verbosity::for_development(self.config.server.development))
                    .build();
                tracing::info!(port, "multiplexing REST, gRPC-Web and gRPC on one port");
                vec![Listener::new(
                    "multiplexed",
                    self.config.bind_addr(port)?,
                    Arc::new(mux),
                )]
            }
            Topology::Split {
                rest_port,
                rpc_port,
            } => {
                tracing::info!(rest_port, rpc_port, "serving REST and gRPC on separate ports");
                vec![
                    Listener::new(
                        "rest",
                        self.config.bind_addr(rest_port)?,
                        Arc::clone(&services.rest),
                    ),
                    Listener::new(
                        "rpc",
                        self.config.bind_addr(rpc_port)?,
                        Arc::clone(&services.rpc),
                    ),
                ]
            }
        };
        Ok(listeners)
    }

    /// Binds every listener.
    ///
    /// # Errors
    ///
    /// Returns the first [`ServerError::Bind`]; listeners bound before it are
    /// closed again.
    pub async fn start(self) -> ServerResult<Started> {
        let mut bound = Vec::new();
        for listener in self.listeners()? {
            bound.push(listener.bind().await?);
        }
        Ok(Started {
            listeners: bound,
            telemetry: self.telemetry,
            registry: self.registry,
            budget: self.config.shutdown_budget(),
        })
    }

    /// Binds, serves until `cancel` fires, and shuts down.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::start`] and [`Started::run`].
    pub async fn run(self, cancel: ShutdownSignal) -> ServerResult<ShutdownReport> {
        self.start().await?.run(cancel).await
    }
}

/// Bound listeners waiting to serve.
#[derive(Debug)]
pub struct Started {
    listeners: Vec<BoundListener>,
    telemetry: Telemetry,
    registry: TaskRegistry,
    budget: Duration,
}

impl Started {
    /// Names and bound addresses of the listeners.
    pub fn local_addrs(&self) -> Vec<(&'static str, SocketAddr)> {
        self.listeners
            .iter()
            .map(|l| (l.name(), l.local_addr()))
            .collect()
    }

    /// Bound address of the listener called `name`.
    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.listeners
            .iter()
            .find(|l| l.name() == name)
            .map(BoundListener::local_addr)
    }

    /// Serves until `cancel` fires, then drains within the shutdown budget.
    ///
    /// A fatal accept error on any listener fires `cancel` as well.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Accept`] if a listener failed while serving, or
    /// [`ServerError::Join`] if a listener task panicked. The drain still runs
    /// to completion first.
    pub async fn run(self, cancel: ShutdownSignal) -> ServerResult<ShutdownReport> {
        let Self {
            listeners,
            telemetry,
            registry,
            budget,
        } = self;

        let force = ShutdownSignal::new();
        let signals = ListenerSignals {
            drain: cancel.clone(),
            force: force.clone(),
        };

        let serving: Vec<_> = listeners
            .into_iter()
            .map(|listener| {
                let name = listener.name();
                let task = registry.spawn(
                    format!("listener:{name}"),
                    listener.serve(registry.clone(), signals.clone()),
                );
                (name, task)
            })
            .collect();

        let flush = flush_budget(budget);
        let telemetry_task = {
            let cancel = cancel.clone();
            registry.spawn("telemetry", async move {
                cancel.recv().await;
                telemetry.shutdown(flush).await
            })
        };

        cancel.recv().await;
        let started = Instant::now();
        tracing::info!(
            budget_secs = budget.as_secs(),
            flush_budget_ms = flush.as_millis() as u64,
            remaining_tasks = registry.len(),
            "shutting down"
        );

        let drained = match started.checked_add(budget) {
            Some(deadline) => registry.wait_idle_until(deadline).await,
            None => {
                registry.wait_idle().await;
                true
            }
        };
        let abandoned_tasks = if drained {
            Vec::new()
        } else {
            let names = registry.names();
            tracing::warn!(
                remaining_tasks = names.len(),
                tasks = ?names,
                "shutdown deadline passed, forcing remaining work closed"
            );
            force.trigger();
            names
        };

        let mut outcome = DrainOutcome::Graceful;
        let mut failure = None;
        for (name, task) in serving {
            match task.await {
                Ok(Ok(drain)) => outcome = outcome.merge(drain),
                Ok(Err(err)) => {
                    failure.get_or_insert(err);
                }
                Err(source) => {
                    failure.get_or_insert(ServerError::Join {
                        task: format!("listener:{name}"),
                        source,
                    });
                }
            }
        }

        let telemetry = if drained {
            telemetry_task.await.ok()
        } else {
            telemetry_task.abort();
            None
        };

        let report = ShutdownReport {
            listeners: outcome,
            telemetry,
            elapsed: started.elapsed(),
            abandoned_tasks,
        };
        if report.is_graceful() {
            tracing::info!(
                elapsed_ms = report.elapsed.as_millis() as u64,
                "shutdown complete"
            );
        } else {
            tracing::warn!(
                elapsed_ms = report.elapsed.as_millis() as u64,
                "shutdown degraded"
            );
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }
}
