//! Per-request correlation state.
//!
//! Every REST request is tagged with a [`CorrelationId`] at the boundary. The
//! identifier is either propagated from the inbound `X-Correlation-ID` header or
//! freshly generated, and is read-only for the rest of the request.

use std::time::{Duration, Instant};

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header carrying the correlation identifier, in both directions.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// A correlation identifier attached to one inbound request.
///
/// # Example
///
/// ```
/// use portico_core::CorrelationId;
///
/// let id = CorrelationId::from("abc-123");
/// assert_eq!(id.as_str(), "abc-123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a new identifier from a UUID v7.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Reuses the inbound `X-Correlation-ID` header if present and non-empty,
    /// otherwise generates a new identifier.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map_or_else(Self::generate, |value| Self(value.to_owned()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// State available to a REST handler for the duration of one request.
///
/// The context is inserted into the request's extensions by the REST wrapper
/// before the handler runs, so handlers retrieve it with
/// `request.extensions().get::<RequestContext>()`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    development: bool,
    started_at: Instant,
}

impl RequestContext {
    /// Creates a context for a request.
    #[must_use]
    pub fn new(correlation_id: CorrelationId, development: bool) -> Self {
        Self {
            correlation_id,
            development,
            started_at: Instant::now(),
        }
    }

    /// Returns the correlation identifier.
    #[must_use]
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Returns `true` when the process runs in development mode.
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.development
    }

    /// Time elapsed since the request entered the REST group.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_header_is_reused_verbatim() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(CorrelationId::from_headers(&headers).as_str(), "abc-123");
    }

    #[test]
    fn test_missing_header_generates() {
        let id = CorrelationId::from_headers(&HeaderMap::new());
        assert!(!id.as_str().is_empty());
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_empty_header_generates() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID_HEADER, HeaderValue::from_static(""));
        let id = CorrelationId::from_headers(&headers);
        assert!(!id.as_str().is_empty());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(CorrelationId::generate(), CorrelationId::generate());
    }

    #[test]
    fn test_context_accessors() {
        let ctx = RequestContext::new(CorrelationId::from("id-1"), true);
        assert_eq!(ctx.correlation_id().as_str(), "id-1");
        assert!(ctx.is_development());
    }
}
