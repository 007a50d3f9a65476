//! REST handler group.
//!
//! [`RestRouter`] wraps every route in the same boundary:
//!
//! - a correlation id is taken from `X-Correlation-ID` or generated
//! - an OpenTelemetry server span is started, parented on any inbound W3C
//!   trace context; handlers find its [`opentelemetry::Context`] in the
//!   request extensions
//! - a [`RequestContext`] and the matched [`PathParams`] are put in the request
//!   extensions
//! - a panicking handler becomes a 500 failure envelope
//! - a handler exceeding the request timeout becomes a 503 failure envelope
//! - unknown paths get the not-found envelope, known paths with the wrong
//!   method a 405 failure
//!
//! Every request therefore ends with exactly one JSON envelope.

mod index;
mod routes;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use http::StatusCode;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt as _, Tracer as _};
use opentelemetry::KeyValue;
use portico_core::{
    panic_message, ApiError, BoxFuture, CorrelationId, Envelope, Handler, HttpRequest,
    HttpResponse, RequestContext,
};
use tracing::Instrument;

pub use index::{index, INDEX_SPAN};
pub use routes::PathParams;

use routes::{Lookup, RouteTable};

/// Instrumentation scope of REST spans.
pub(crate) const TRACER_NAME: &str = "portico-server";

type RouteFn = Arc<dyn Fn(HttpRequest) -> BoxFuture<'static, Envelope> + Send + Sync>;

/// Routes REST requests to envelope-producing handlers.
#[derive(Clone)]
pub struct RestRouter {
    routes: Arc<RouteTable<RouteFn>>,
    prefix: String,
    development: bool,
    request_timeout: Duration,
}

impl std::fmt::Debug for RestRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestRouter")
            .field("routes", &self.routes.len())
            .field("prefix", &self.prefix)
            .field("development", &self.development)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl RestRouter {
    /// Creates a builder with no routes.
    #[must_use]
    pub fn builder() -> RestRouterBuilder {
        RestRouterBuilder::default()
    }

    /// The router serving the bundled `GET /v1/` route.
    #[must_use]
    pub fn service(prefix: &str, development: bool, request_timeout: Duration) -> Self {
        Self::builder()
            .ingress_prefix(prefix)
            .development(development)
            .request_timeout(request_timeout)
            .route(http::Method::GET, "/v1/", index)
            .build()
    }

    fn strip_prefix<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.prefix.is_empty() {
            return Some(path);
        }
        let rest = path.strip_prefix(self.prefix.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }

    async fn dispatch(&self, mut request: HttpRequest) -> Envelope {
        let Some(path) = self.strip_prefix(request.uri().path()) else {
            return Envelope::not_found();
        };

        let (route, params) = match self.routes.lookup(request.method(), path) {
            Lookup::Found(route, params) => (Arc::clone(route), params),
            Lookup::MethodNotAllowed => {
                return Envelope::failure(ApiError::method_not_allowed(request.method()))
            }
            Lookup::NotFound => return Envelope::not_found(),
        };
        request.extensions_mut().insert(params);

        // Calling the route inside the guarded future also catches panics
        // raised before its first await.
        let guarded = AssertUnwindSafe(async move { route(request).await }).catch_unwind();
        match tokio::time::timeout(self.request_timeout, guarded).await {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(payload)) => {
                let reason = panic_message(payload.as_ref());
                tracing::error!(panic = reason, "rest handler panicked");
                Envelope::failure(ApiError::internal(format!("handler panicked: {reason}")))
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "rest handler timed out"
                );
                Envelope::failure(ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "request timed out",
                ))
            }
        }
    }
}

impl Handler for RestRouter {
    fn handle(&self, mut request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
        Box::pin(async move {
            let ctx = RequestContext::new(
                CorrelationId::from_headers(request.headers()),
                self.development,
            );
            let span = tracing::info_span!(
                "rest",
                correlation_id = %ctx.correlation_id(),
                method = %request.method(),
                path = request.uri().path(),
            );
            let otel = server_span(&request, &ctx);
            request.extensions_mut().insert(ctx.clone());
            request.extensions_mut().insert(otel.clone());

            let envelope = self.dispatch(request).instrument(span.clone()).await;
            let status = envelope.status();
            span.in_scope(|| {
                tracing::debug!(
                    status = status.as_u16(),
                    elapsed_ms = ctx.elapsed().as_millis() as u64,
                    "request completed"
                );
            });

            let server = otel.span();
            server.set_attribute(KeyValue::new(
                "http.response.status_code",
                i64::from(status.as_u16()),
            ));
            if status.is_server_error() {
                server.set_status(Status::error(status.to_string()));
            }
            server.end();
            envelope.into_response(&ctx)
        })
    }
}

/// Starts the per-request server span and returns the context carrying it.
fn server_span(request: &HttpRequest, ctx: &RequestContext) -> opentelemetry::Context {
    let tracer = portico_telemetry::tracer(TRACER_NAME);
    let parent = portico_telemetry::extract_context(request.headers());
    let span = tracer
        .span_builder(format!("{} {}", request.method(), request.uri().path()))
        .with_kind(SpanKind::Server)
        .with_attributes([
            KeyValue::new("http.request.method", request.method().to_string()),
            KeyValue::new("url.path", request.uri().path().to_string()),
            KeyValue::new("CorrelationId", ctx.correlation_id().to_string()),
        ])
        .start_with_context(&tracer, &parent);
    parent.with_span(span)
}

/// Builder for [`RestRouter`].
pub struct RestRouterBuilder {
    routes: RouteTable<RouteFn>,
    prefix: String,
    development: bool,
    request_timeout: Duration,
}

impl Default for RestRouterBuilder {
    fn default() -> Self {
        Self {
            routes: RouteTable::default(),
            prefix: String::new(),
            development: false,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RestRouterBuilder {
    /// Path prefix in front of every route, e.g. `/api`.
    pub fn ingress_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim().trim_end_matches('/');
        self.prefix = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    /// Exposes error details in failure envelopes.
    pub fn development(mut self, development: bool) -> Self {
        self.development = development;
        self
    }

    /// Upper bound on a single handler invocation.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Registers `handler` for `method` and `pattern`.
    ///
    /// The handler finds its [`RequestContext`] and [`PathParams`] in the
    /// request extensions.
    pub fn route<F, Fut>(mut self, method: http::Method, pattern: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Envelope> + Send + 'static,
    {
        let route: RouteFn = Arc::new(move |request: HttpRequest| -> BoxFuture<'static, Envelope> {
            Box::pin(handler(request))
        });
        self.routes.insert(method, pattern, route);
        self
    }

    /// Builds the router.
    pub fn build(self) -> RestRouter {
        RestRouter {
            routes: Arc::new(self.routes),
            prefix: self.prefix,
            development: self.development,
            request_timeout: self.request_timeout,
        }
    }
}
