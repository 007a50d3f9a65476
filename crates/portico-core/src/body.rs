//! Boxed body and message aliases.
//!
//! Every handler in Portico speaks the same request and response types so the
//! multiplexer can forward a request without knowing who receives it. Bodies are
//! boxed with [`UnsyncBoxBody`], which only requires `Send`; hyper's incoming
//! body and streaming bodies with trailers both fit.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

/// Error type carried by boxed bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A type-erased HTTP body.
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// An HTTP request with a boxed body.
pub type HttpRequest = http::Request<Body>;

/// An HTTP response with a boxed body.
pub type HttpResponse = http::Response<Body>;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Creates a body holding `data` in a single frame.
pub fn full(data: impl Into<Bytes>) -> Body {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Creates an empty body.
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Builds a JSON response with the given status.
pub fn json(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = http::Response::new(full(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_body_yields_data() {
        let collected = full("hello").collect().await.unwrap().to_bytes();
        assert_eq!(collected, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_empty_body() {
        let collected = empty().collect().await.unwrap().to_bytes();
        assert!(collected.is_empty());
    }

    #[test]
    fn test_json_response_headers() {
        let response = json(StatusCode::CREATED, "{}");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
    }
}
