//! Handler capabilities.
//!
//! The multiplexer depends only on these traits, never on the concrete REST
//! group, RPC dispatcher or gRPC-Web adapter behind them.

use crate::body::{BoxFuture, HttpRequest, HttpResponse};

/// Something that turns one request into exactly one response.
///
/// Implementations must report their own failures through the response
/// (an envelope, a gRPC status); the returned future never errors.
pub trait Handler: Send + Sync + 'static {
    /// Handles a request.
    fn handle(&self, request: HttpRequest) -> BoxFuture<'_, HttpResponse>;
}

/// A [`Handler`] speaking a browser-compatible RPC framing.
pub trait WebRpcHandler: Handler {
    /// Returns `true` if the request uses this handler's framing.
    ///
    /// Only the request head may be inspected; the body must be left untouched.
    fn is_web_rpc_request(&self, request: &HttpRequest) -> bool;
}

/// Extracts the message of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

impl<T: Handler + ?Sized> Handler for std::sync::Arc<T> {
    fn handle(&self, request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
        (**self).handle(request)
    }
}

impl<T: WebRpcHandler + ?Sized> WebRpcHandler for std::sync::Arc<T> {
    fn is_web_rpc_request(&self, request: &HttpRequest) -> bool {
        (**self).is_web_rpc_request(request)
    }
}
