//! Exporter lifecycle.
//!
//! A [`Telemetry`] handle owns the tracer provider from startup until the
//! orchestrator drains it. Draining flushes pending spans under a budget carved
//! out of the overall shutdown budget by [`flush_budget`].

use std::time::{Duration, Instant};

use opentelemetry_sdk::trace::TracerProvider;

use crate::config::TelemetryConfig;
use crate::tracing::{init_tracing, SpanExporterKind};
use crate::TelemetryResult;

/// Upper bound on the flush budget regardless of the overall budget.
pub const MAX_FLUSH_BUDGET: Duration = Duration::from_secs(10);

/// Flush budget for an overall shutdown budget: `min(10s, total / 2)`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use portico_telemetry::flush_budget;
///
/// assert_eq!(flush_budget(Duration::from_secs(300)), Duration::from_secs(10));
/// assert_eq!(flush_budget(Duration::from_secs(8)), Duration::from_secs(4));
/// ```
#[must_use]
pub fn flush_budget(total: Duration) -> Duration {
    MAX_FLUSH_BUDGET.min(total / 2)
}

/// How a telemetry drain ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing to flush; export was disabled.
    Skipped,
    /// Pending spans were exported and the provider shut down.
    Flushed {
        /// Time spent flushing.
        elapsed: Duration,
    },
    /// The budget elapsed first; unexported spans are lost.
    TimedOut {
        /// The budget that elapsed.
        budget: Duration,
    },
    /// The exporter reported an error.
    Failed(String),
}

impl FlushOutcome {
    /// Returns `true` unless the flush timed out or failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Skipped | Self::Flushed { .. })
    }
}

/// Handle to the running exporter.
pub struct Telemetry {
    provider: Option<TracerProvider>,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("exporting", &self.is_exporting())
            .finish()
    }
}

impl Telemetry {
    /// Starts exporting according to `config`.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError` if the exporter cannot be initialized. This is
    /// startup-fatal.
    pub fn start(config: &TelemetryConfig) -> TelemetryResult<Self> {
        let provider = init_tracing(&config.tracing)?;
        match (&provider, config.tracing.exporter) {
            (None, _) => {}
            (Some(_), SpanExporterKind::Otlp) => ::tracing::info!(
                endpoint = %config.tracing.otlp_endpoint,
                service = %config.service_name,
                "span export started"
            ),
            (Some(_), SpanExporterKind::Stdout) => ::tracing::info!(
                service = %config.service_name,
                "span export to stdout started"
            ),
        }
        Ok(Self { provider })
    }

    /// Takes ownership of an already built provider.
    #[must_use]
    pub fn with_provider(provider: TracerProvider) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// A handle with no exporter.
    #[must_use]
    pub fn disabled() -> Self {
        Self { provider: None }
    }

    /// Returns `true` if spans are being exported.
    #[must_use]
    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }

    /// Flushes pending spans and shuts the provider down within `budget`.
    pub async fn shutdown(self, budget: Duration) -> FlushOutcome {
        let Some(provider) = self.provider else {
            return FlushOutcome::Skipped;
        };

        let outcome = flush_within(budget, move || {
            for result in provider.force_flush() {
                result.map_err(|e| e.to_string())?;
            }
            provider.shutdown().map_err(|e| e.to_string())
        })
        .await;

        match &outcome {
            FlushOutcome::TimedOut { budget } => ::tracing::warn!(
                budget_ms = budget.as_millis() as u64,
                "telemetry flush exceeded its budget"
            ),
            FlushOutcome::Failed(reason) => {
                ::tracing::warn!(%reason, "telemetry flush failed");
            }
            FlushOutcome::Flushed { elapsed } => ::tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "telemetry flushed"
            ),
            FlushOutcome::Skipped => {}
        }
        outcome
    }
}

// The SDK's flush blocks the calling thread. It runs on a detached thread
// that is never joined, so an abandoned flush cannot hold up runtime shutdown.
async fn flush_within<F>(budget: Duration, flush: F) -> FlushOutcome
where
    F: FnOnce() -> Result<(), String> + Send + 'static,
{
    let started = Instant::now();
    let (done, result) = tokio::sync::oneshot::channel();
    let spawned = std::thread::Builder::new()
        .name("portico-telemetry-flush".to_string())
        .spawn(move || {
            let _ = done.send(flush());
        });
    if let Err(err) = spawned {
        return FlushOutcome::Failed(format!("cannot start flush thread: {err}"));
    }

    match tokio::time::timeout(budget, result).await {
        Ok(Ok(Ok(()))) => FlushOutcome::Flushed {
            elapsed: started.elapsed(),
        },
        Ok(Ok(Err(reason))) => FlushOutcome::Failed(reason),
        Ok(Err(_)) => FlushOutcome::Failed("flush thread panicked".to_string()),
        Err(_) => FlushOutcome::TimedOut { budget },
    }
}
