//! `GET /v1/`.

use opentelemetry::trace::{Span as _, Tracer as _};
use opentelemetry::KeyValue;
use portico_core::{Envelope, HttpRequest, RequestContext};
use serde::Serialize;

/// Name of the span recorded for every index request.
pub const INDEX_SPAN: &str = "IndexGet";

#[derive(Serialize)]
struct Motto {
    #[serde(rename = "Motto")]
    motto: &'static str,
}

/// Answers with the service motto.
///
/// Records an [`INDEX_SPAN`] span tagged with the request's correlation id.
/// The span is a child of the router's server span, or of the inbound W3C
/// trace context when called outside a router.
pub async fn index(request: HttpRequest) -> Envelope {
    let tracer = portico_telemetry::tracer(super::TRACER_NAME);
    let parent = request
        .extensions()
        .get::<opentelemetry::Context>()
        .cloned()
        .unwrap_or_else(|| portico_telemetry::extract_context(request.headers()));
    let mut span = tracer.start_with_context(INDEX_SPAN, &parent);
    if let Some(ctx) = request.extensions().get::<RequestContext>() {
        span.set_attribute(KeyValue::new(
            "CorrelationId",
            ctx.correlation_id().to_string(),
        ));
    }

    let envelope = Envelope::success(&Motto {
        motto: "Hello world!",
    });
    span.end();
    envelope
}
