//! Native gRPC dispatcher.
//!
//! [`RpcDispatcher`] serves unary calls over HTTP/2: it reads one
//! length-prefixed message, routes `/{service}/{method}` to a registered
//! [`RpcService`], and answers with a data frame followed by `grpc-status`
//! trailers. Failures before a reply use a trailers-only response.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue};
use http_body_util::{BodyExt, LengthLimitError, Limited, StreamBody};
use hyper::body::Frame;
use portico_core::{
    empty, panic_message, Body, BoxError, BoxFuture, Handler, HttpRequest, HttpResponse,
};
use tracing::{debug, error, warn};

use crate::frame::{decode_unary, encode_message, HEADER_SIZE, MAX_MESSAGE_SIZE};
use crate::metadata::CallContext;
use crate::service::RpcService;
use crate::status::RpcStatus;

/// Media type of native gRPC responses.
pub const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// Routes unary gRPC calls to registered services.
///
/// # Example
///
/// ```
/// use portico_rpc::{Greeter, RpcDispatcher};
///
/// let dispatcher = RpcDispatcher::builder()
///     .service(Greeter::new())
///     .build();
/// assert!(dispatcher.has_service("helloworld.Greeter"));
/// ```
pub struct RpcDispatcher {
    services: HashMap<&'static str, Arc<dyn RpcService>>,
    max_message_bytes: usize,
}

impl std::fmt::Debug for RpcDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcDispatcher")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .field("max_message_bytes", &self.max_message_bytes)
            .finish()
    }
}

impl RpcDispatcher {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> RpcDispatcherBuilder {
        RpcDispatcherBuilder::default()
    }

    /// Returns `true` if a service is registered under `name`.
    pub fn has_service(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Largest accepted message, in bytes.
    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Invokes the method at `path` with an already unframed message.
    ///
    /// Enforces the `grpc-timeout` deadline and converts a panicking service
    /// into `INTERNAL`.
    pub async fn invoke(
        &self,
        path: &str,
        headers: &HeaderMap,
        message: Bytes,
    ) -> Result<Bytes, RpcStatus> {
        let (service_name, method) = split_path(path)
            .ok_or_else(|| RpcStatus::unimplemented(format!("malformed method path {path}")))?;
        let service = self
            .services
            .get(service_name)
            .cloned()
            .ok_or_else(|| RpcStatus::unimplemented(format!("unknown service {service_name}")))?;

        let ctx = CallContext::from_request(path, headers)?;
        let deadline = ctx.deadline();
        let call = AssertUnwindSafe(service.call(method, ctx, message)).catch_unwind();

        let outcome = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, call)
                .await
                .map_err(|_| RpcStatus::deadline_exceeded("deadline exceeded"))?,
            None => call.await,
        };

        match outcome {
            Ok(result) => result,
            Err(panic) => {
                error!(method = path, panic = panic_message(panic.as_ref()), "rpc handler panicked");
                Err(RpcStatus::internal("internal error"))
            }
        }
    }

    async fn unary(&self, path: &str, headers: &HeaderMap, body: Body) -> Result<Bytes, RpcStatus> {
        let raw = collect_limited(body, self.max_message_bytes + HEADER_SIZE).await?;
        let message = decode_unary(raw, self.max_message_bytes)?;
        self.invoke(path, headers, message).await
    }
}

impl Handler for RpcDispatcher {
    fn handle(&self, request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let path = parts.uri.path();
            match self.unary(path, &parts.headers, body).await {
                Ok(reply) => reply_response(reply),
                Err(status) => {
                    debug!(method = path, %status, "rpc failed");
                    trailers_only(&status)
                }
            }
        })
    }
}

/// Builder for [`RpcDispatcher`].
#[derive(Default)]
pub struct RpcDispatcherBuilder {
    services: HashMap<&'static str, Arc<dyn RpcService>>,
    max_message_bytes: Option<usize>,
}

impl RpcDispatcherBuilder {
    /// Registers a service. A later service with the same name replaces the earlier one.
    #[must_use]
    pub fn service(mut self, service: impl RpcService) -> Self {
        let name = service.name();
        if self.services.insert(name, Arc::new(service)).is_some() {
            warn!(service = name, "rpc service registered twice; keeping the last one");
        }
        self
    }

    /// Sets the largest accepted message. Defaults to 4 MiB.
    #[must_use]
    pub fn max_message_bytes(mut self, max: usize) -> Self {
        self.max_message_bytes = Some(max);
        self
    }

    /// Builds the dispatcher.
    #[must_use]
    pub fn build(self) -> RpcDispatcher {
        RpcDispatcher {
            services: self.services,
            max_message_bytes: self.max_message_bytes.unwrap_or(MAX_MESSAGE_SIZE),
        }
    }
}

// "/pkg.Service/Method" -> ("pkg.Service", "Method")
fn split_path(path: &str) -> Option<(&str, &str)> {
    let (service, method) = path.strip_prefix('/')?.split_once('/')?;
    if service.is_empty() || method.is_empty() || method.contains('/') {
        return None;
    }
    Some((service, method))
}

// Must stay boxed: awaiting `Limited` inline breaks the handler future's
// `Send` bound.
pub(crate) fn collect_limited(
    body: Body,
    limit: usize,
) -> BoxFuture<'static, Result<Bytes, RpcStatus>> {
    let collect: BoxFuture<'static, Result<_, BoxError>> =
        Box::pin(Limited::new(body, limit).collect());
    Box::pin(async move {
        let collected = collect.await.map_err(|err: BoxError| {
            if err.downcast_ref::<LengthLimitError>().is_some() {
                RpcStatus::resource_exhausted(format!("request body exceeds {limit} bytes"))
            } else {
                RpcStatus::internal(format!("failed to read request body: {err}"))
            }
        })?;
        Ok(collected.to_bytes())
    })
}

fn reply_response(reply: Bytes) -> HttpResponse {
    let mut trailers = HeaderMap::new();
    RpcStatus::ok().write_to(&mut trailers);
    let frames: Vec<Result<Frame<Bytes>, BoxError>> = vec![
        Ok(Frame::data(encode_message(&reply))),
        Ok(Frame::trailers(trailers)),
    ];
    let body = StreamBody::new(futures_util::stream::iter(frames)).boxed_unsync();

    let mut response = http::Response::new(body);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(GRPC_CONTENT_TYPE));
    response
}

fn trailers_only(status: &RpcStatus) -> HttpResponse {
    let mut response = http::Response::new(empty());
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(GRPC_CONTENT_TYPE));
    status.write_to(response.headers_mut());
    response
}
