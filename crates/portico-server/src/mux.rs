//! Protocol multiplexer.
//!
//! One listener, three protocols. Each request is classified from its head
//! alone, first match wins:
//!
//! 1. HTTP/2 with an `application/grpc` media type: native gRPC.
//! 2. The gRPC-Web detector accepts it: gRPC-Web.
//! 3. Anything else: REST.
//!
//! Classification never touches the body, so the selected handler receives the
//! request exactly as it arrived.

use std::sync::Arc;

use http::header::CONTENT_TYPE;
use http::{StatusCode, Version};
use portico_core::{empty, BoxFuture, Handler, HttpRequest, HttpResponse, WebRpcHandler};

const RPC_MEDIA_TYPE: &str = "application/grpc";

/// Which handler a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Native gRPC over HTTP/2.
    NativeRpc,
    /// gRPC-Web over any HTTP version.
    WebRpc,
    /// Everything else.
    PlainHttp,
}

impl Classification {
    /// Short name used in log records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NativeRpc => "native-rpc",
            Self::WebRpc => "web-rpc",
            Self::PlainHttp => "plain-http",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns `true` for HTTP/2 requests carrying an `application/grpc` media type.
///
/// `application/grpc`, `application/grpc+proto` and `application/grpc; charset=…`
/// qualify; `application/grpc-web…` does not.
pub fn is_native_rpc(request: &HttpRequest) -> bool {
    request.version() == Version::HTTP_2
        && request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_rpc_media_type)
}

fn is_rpc_media_type(content_type: &str) -> bool {
    let content_type = content_type.trim_start();
    let Some(head) = content_type.get(..RPC_MEDIA_TYPE.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(RPC_MEDIA_TYPE) {
        return false;
    }
    matches!(
        content_type[RPC_MEDIA_TYPE.len()..].chars().next(),
        None | Some('+' | ';' | ' ')
    )
}

/// Classifies a request. Pure: reads the head only.
///
/// Without a gRPC-Web detector, step 2 never matches.
pub fn classify(request: &HttpRequest, web: Option<&dyn WebRpcHandler>) -> Classification {
    if is_native_rpc(request) {
        Classification::NativeRpc
    } else if web.is_some_and(|web| web.is_web_rpc_request(request)) {
        Classification::WebRpc
    } else {
        Classification::PlainHttp
    }
}

/// Whether routing decisions are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Emit one debug record per request naming its classification.
    Verbose,
    /// Route without logging.
    #[default]
    Silent,
}

impl Verbosity {
    /// Verbose in development mode, silent otherwise.
    #[must_use]
    pub fn for_development(development: bool) -> Self {
        if development {
            Self::Verbose
        } else {
            Self::Silent
        }
    }
}

/// Routes requests on a shared listener to one of three handlers.
#[derive(Clone)]
pub struct Multiplexer {
    rpc: Option<Arc<dyn Handler>>,
    web: Option<Arc<dyn WebRpcHandler>>,
    rest: Option<Arc<dyn Handler>>,
    verbosity: Verbosity,
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("rpc", &self.rpc.is_some())
            .field("web", &self.web.is_some())
            .field("rest", &self.rest.is_some())
            .field("verbosity", &self.verbosity)
            .finish()
    }
}

impl Multiplexer {
    /// Creates a builder with no handlers attached.
    #[must_use]
    pub fn builder() -> MultiplexerBuilder {
        MultiplexerBuilder::default()
    }

    /// The configured verbosity.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Classifies `request`, logging the decision in verbose mode.
    pub fn route(&self, request: &HttpRequest) -> Classification {
        let classification = classify(request, self.web.as_deref());
        if self.verbosity == Verbosity::Verbose {
            tracing::debug!(
                classification = classification.as_str(),
                version = ?request.version(),
                path = request.uri().path(),
                "request classified"
            );
        }
        classification
    }
}

impl Handler for Multiplexer {
    fn handle(&self, request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
        Box::pin(async move {
            let classification = self.route(&request);
            match classification {
                Classification::NativeRpc => match &self.rpc {
                    Some(rpc) => rpc.handle(request).await,
                    None => unroutable(classification),
                },
                Classification::WebRpc => match &self.web {
                    Some(web) => web.handle(request).await,
                    None => unroutable(classification),
                },
                Classification::PlainHttp => match &self.rest {
                    Some(rest) => rest.handle(request).await,
                    None => unroutable(classification),
                },
            }
        })
    }
}

fn unroutable(classification: Classification) -> HttpResponse {
    tracing::error!(
        classification = classification.as_str(),
        "no handler wired for classified request"
    );
    let mut response = HttpResponse::new(empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Builder for [`Multiplexer`].
#[derive(Default)]
pub struct MultiplexerBuilder {
    rpc: Option<Arc<dyn Handler>>,
    web: Option<Arc<dyn WebRpcHandler>>,
    rest: Option<Arc<dyn Handler>>,
    verbosity: Verbosity,
}

impl MultiplexerBuilder {
    /// Native gRPC target.
    pub fn rpc(mut self, handler: Arc<dyn Handler>) -> Self {
        self.rpc = Some(handler);
        self
    }

    /// gRPC-Web target; also supplies the detector.
    pub fn web(mut self, handler: Arc<dyn WebRpcHandler>) -> Self {
        self.web = Some(handler);
        self
    }

    /// REST target.
    pub fn rest(mut self, handler: Arc<dyn Handler>) -> Self {
        self.rest = Some(handler);
        self
    }

    /// Sets whether routing decisions are logged.
    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Builds the multiplexer.
    pub fn build(self) -> Multiplexer {
        Multiplexer {
            rpc: self.rpc,
            web: self.web,
            rest: self.rest,
            verbosity: self.verbosity,
        }
    }
}
