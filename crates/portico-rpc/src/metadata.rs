//! Call metadata and deadlines.

use std::time::Duration;

use http::HeaderMap;
use tokio::time::Instant;

use crate::status::RpcStatus;

/// Request header carrying the client's deadline.
pub const GRPC_TIMEOUT: &str = "grpc-timeout";

/// A `grpc-timeout` value.
///
/// Format: `<value><unit>` with at most eight digits, where unit is one of
/// `n` (nanoseconds), `u` (microseconds), `m` (milliseconds), `S` (seconds),
/// `M` (minutes) or `H` (hours).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout(Duration);

impl Timeout {
    /// Parse a header value.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() < 2 || s.len() > 9 {
            return None;
        }

        let (value_str, unit) = s.split_at(s.len() - 1);
        if !value_str.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value: u64 = value_str.parse().ok()?;

        let duration = match unit {
            "n" => Duration::from_nanos(value),
            "u" => Duration::from_micros(value),
            "m" => Duration::from_millis(value),
            "S" => Duration::from_secs(value),
            "M" => Duration::from_secs(value * 60),
            "H" => Duration::from_secs(value * 3600),
            _ => return None,
        };

        Some(Self(duration))
    }

    /// The timeout as a duration.
    pub fn as_duration(self) -> Duration {
        self.0
    }
}

/// Per-call state handed to a service method.
///
/// Dropping the call future cancels the call; the dispatcher does so when the
/// deadline passes or the client goes away.
#[derive(Debug, Clone)]
pub struct CallContext {
    method: String,
    deadline: Option<Instant>,
    metadata: HeaderMap,
}

impl CallContext {
    /// Builds the context for `path` from the request headers.
    ///
    /// # Errors
    ///
    /// Returns `INTERNAL` when `grpc-timeout` is present but malformed.
    pub fn from_request(path: &str, headers: &HeaderMap) -> Result<Self, RpcStatus> {
        let timeout = match headers.get(GRPC_TIMEOUT) {
            None => None,
            Some(value) => {
                let parsed = value.to_str().ok().and_then(Timeout::parse);
                match parsed {
                    Some(timeout) => Some(timeout),
                    None => return Err(RpcStatus::internal("malformed grpc-timeout")),
                }
            }
        };
        Ok(Self {
            method: path.to_string(),
            deadline: timeout.map(|t| Instant::now() + t.as_duration()),
            metadata: headers.clone(),
        })
    }

    /// A context with no deadline and no metadata.
    pub fn detached(path: &str) -> Self {
        Self {
            method: path.to_string(),
            deadline: None,
            metadata: HeaderMap::new(),
        }
    }

    /// Full method path, e.g. `/helloworld.Greeter/SayHello`.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Instant after which the call is abandoned, if the client set one.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Request headers.
    pub fn metadata(&self) -> &HeaderMap {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_timeout_parse_units() {
        assert_eq!(Timeout::parse("100n").unwrap().as_duration(), Duration::from_nanos(100));
        assert_eq!(Timeout::parse("5u").unwrap().as_duration(), Duration::from_micros(5));
        assert_eq!(Timeout::parse("250m").unwrap().as_duration(), Duration::from_millis(250));
        assert_eq!(Timeout::parse("3S").unwrap().as_duration(), Duration::from_secs(3));
        assert_eq!(Timeout::parse("2M").unwrap().as_duration(), Duration::from_secs(120));
        assert_eq!(Timeout::parse("1H").unwrap().as_duration(), Duration::from_secs(3600));
    }

    #[test]
    fn test_timeout_parse_rejects_malformed() {
        assert!(Timeout::parse("").is_none());
        assert!(Timeout::parse("S").is_none());
        assert!(Timeout::parse("10s").is_none());
        assert!(Timeout::parse("-1S").is_none());
        assert!(Timeout::parse("123456789S").is_none());
    }

    #[tokio::test]
    async fn test_context_deadline_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(GRPC_TIMEOUT, HeaderValue::from_static("1S"));
        let ctx = CallContext::from_request("/a.B/C", &headers).unwrap();
        assert_eq!(ctx.method(), "/a.B/C");
        let remaining = ctx.deadline().unwrap() - Instant::now();
        assert!(remaining <= Duration::from_secs(1));
    }

    #[test]
    fn test_context_without_timeout() {
        let ctx = CallContext::from_request("/a.B/C", &HeaderMap::new()).unwrap();
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_context_rejects_malformed_timeout() {
        let mut headers = HeaderMap::new();
        headers.insert(GRPC_TIMEOUT, HeaderValue::from_static("soon"));
        let err = CallContext::from_request("/a.B/C", &headers).unwrap_err();
        assert_eq!(err.code(), crate::Code::Internal);
    }
}
