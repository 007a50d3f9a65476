//! Portico - Entry point
//!
//! Serves REST, gRPC-Web and gRPC until SIGINT or SIGTERM, then drains within
//! the configured shutdown budget.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use portico::config::{ConfigLoader, Overrides};
use portico::server::{Orchestrator, Services, ShutdownSignal};
use portico::telemetry::{init_logging, Telemetry};

/// Default configuration file, read when present.
const DEFAULT_CONFIG_FILE: &str = "portico.toml";

/// Command-line arguments. Flags win over files and the environment.
#[derive(Debug, Parser)]
#[command(name = "portico", version, about = "REST, gRPC-Web and gRPC on one port")]
struct Args {
    /// Shutdown budget in seconds
    #[arg(short = 't', long = "timeout")]
    timeout: Option<u64>,

    /// REST port; equal to the gRPC port for a single multiplexed listener
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// gRPC port
    #[arg(long = "grpc-port")]
    grpc_port: Option<u16>,

    /// Development mode: verbose routing, debug logs, error details in envelopes
    #[arg(short = 'd', long = "devel")]
    devel: bool,

    /// OTLP endpoint, `local` for stdout spans, or `disabled`
    #[arg(short = 'r', long = "telemetry", value_name = "ENDPOINT|local|disabled")]
    telemetry: Option<String>,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            shutdown_timeout_secs: self.timeout,
            http_port: self.port,
            grpc_port: self.grpc_port,
            development: self.devel.then_some(true),
            telemetry: self.telemetry.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let loader = ConfigLoader::new().with_defaults().with_dotenv();
    let loader = match &args.config {
        Some(path) => loader
            .with_file(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => loader.with_optional_file(DEFAULT_CONFIG_FILE)?,
    };
    let config = loader
        .with_service_env()
        .with_env_prefix("PORTICO")
        .with_overrides(args.overrides())
        .load()
        .context("invalid configuration")?;

    init_logging(&portico::log_config(&config)).context("failed to initialize logging")?;
    for warning in config.sanity_warnings() {
        warn!("{warning}");
    }

    let telemetry = Telemetry::start(&portico::telemetry_config(&config))
        .context("failed to start telemetry")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        topology = ?config.topology(),
        development = config.server.development,
        shutdown_timeout_secs = config.server.shutdown_timeout_secs,
        "starting portico"
    );

    let config = Arc::new(config);
    let services = Services::from_config(&config);
    let report = Orchestrator::new(config, services, telemetry)
        .run(ShutdownSignal::with_os_signals())
        .await?;

    if report.is_graceful() {
        info!(elapsed_ms = report.elapsed.as_millis() as u64, "exited cleanly");
    } else {
        warn!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            abandoned = ?report.abandoned_tasks,
            "exited after the shutdown deadline"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_short_flags() {
        let args = Args::parse_from([
            "portico", "-t", "15", "-p", "8080", "--grpc-port", "8080", "-d", "-r", "disabled",
        ]);
        let overrides = args.overrides();
        assert_eq!(overrides.shutdown_timeout_secs, Some(15));
        assert_eq!(overrides.http_port, Some(8080));
        assert_eq!(overrides.grpc_port, Some(8080));
        assert_eq!(overrides.development, Some(true));
        assert_eq!(overrides.telemetry.as_deref(), Some("disabled"));
    }

    #[test]
    fn test_grpc_port_has_no_short_flag() {
        assert!(Args::try_parse_from(["portico", "-g", "9090"]).is_err());
    }

    #[test]
    fn test_absent_flags_leave_config_alone() {
        let overrides = Args::parse_from(["portico"]).overrides();
        assert_eq!(overrides, Overrides::default());
    }
}
