//! Server error types.

use std::net::SocketAddr;

use portico_config::ConfigError;
use portico_telemetry::TelemetryError;
use thiserror::Error;

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Failures that stop the server.
///
/// Per-request failures never surface here; they are answered on the wire.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A listener could not bind. Startup-fatal.
    #[error("{listener} listener cannot bind {addr}")]
    Bind {
        /// Listener name.
        listener: &'static str,
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Accepting failed for a reason other than a dropped peer. Fatal while serving.
    #[error("{listener} listener stopped accepting")]
    Accept {
        /// Listener name.
        listener: &'static str,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be turned into listeners.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The exporter could not start. Startup-fatal.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// A background task panicked.
    #[error("task {task} panicked")]
    Join {
        /// Task name.
        task: String,
        /// Underlying error.
        #[source]
        source: tokio::task::JoinError,
    },
}

impl ServerError {
    /// Returns `true` for errors raised before any listener served.
    #[must_use]
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::Bind { .. } | Self::Config(_) | Self::Telemetry(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let err = ServerError::Bind {
            listener: "rest",
            addr: "127.0.0.1:8080".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert_eq!(err.to_string(), "rest listener cannot bind 127.0.0.1:8080");
        assert!(err.is_startup());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_accept_error_is_not_startup() {
        let err = ServerError::Accept {
            listener: "rpc",
            source: std::io::Error::other("listener closed"),
        };
        assert!(!err.is_startup());
    }
}
