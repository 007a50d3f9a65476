//! REST failure type.

use std::backtrace::{Backtrace, BacktraceStatus};

use http::StatusCode;
use thiserror::Error;

use crate::body::BoxError;

/// A failure raised by a REST handler.
///
/// Rendered by [`Envelope::failure`](crate::Envelope::failure). The message,
/// source chain and captured stack trace only reach the client in development
/// mode.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    message: String,
    #[source]
    source: Option<BoxError>,
    stacktrace: Option<String>,
}

impl ApiError {
    /// Creates an error with the given status and message.
    ///
    /// A status that is not a client or server error is coerced to 500.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let status = if status.is_client_error() || status.is_server_error() {
            status
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let trace = Backtrace::capture();
        let stacktrace = (trace.status() == BacktraceStatus::Captured).then(|| trace.to_string());
        Self {
            status,
            message: message.into(),
            source: None,
            stacktrace,
        }
    }

    /// 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 405 Method Not Allowed.
    pub fn method_not_allowed(method: &http::Method) -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("method {method} not allowed"),
        )
    }

    /// Attaches an underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns the HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the message and its source chain joined by `": "`.
    pub fn detail(&self) -> String {
        let mut detail = self.message.clone();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            detail.push_str(": ");
            detail.push_str(&err.to_string());
            cause = err.source();
        }
        detail
    }

    /// Returns the stack trace captured at construction, if backtraces are enabled.
    pub fn stacktrace(&self) -> Option<&str> {
        self.stacktrace.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_is_kept() {
        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "x").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_non_error_status_is_coerced() {
        assert_eq!(
            ApiError::new(StatusCode::OK, "x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::new(StatusCode::FOUND, "x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_detail_includes_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = ApiError::internal("save failed").with_source(io);
        assert_eq!(err.detail(), "save failed: disk gone");
        assert_eq!(err.to_string(), "save failed");
    }
}
