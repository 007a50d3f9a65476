//! gRPC-Web adapter.
//!
//! Browsers cannot read HTTP/2 trailers, so gRPC-Web moves them into the body:
//! the reply message frame is followed by a frame with flag `0x80` whose
//! payload is a `name:value\r\n` block. The text variant
//! (`application/grpc-web-text`) base64-encodes both directions.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{Bytes, BytesMut};
use http::header::{ACCESS_CONTROL_EXPOSE_HEADERS, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method};
use portico_core::{full, Body, BoxFuture, Handler, HttpRequest, HttpResponse, WebRpcHandler};
use tracing::debug;

use crate::dispatcher::{collect_limited, RpcDispatcher};
use crate::frame::{decode_unary, encode_frame, encode_message, HEADER_SIZE, TRAILER_FLAG};
use crate::status::RpcStatus;

/// Media type prefix shared by every gRPC-Web variant.
pub const GRPC_WEB: &str = "application/grpc-web";

/// Media type prefix of the base64 text variant.
pub const GRPC_WEB_TEXT: &str = "application/grpc-web-text";

const EXPOSED_HEADERS: &str = "grpc-status, grpc-message";

/// Returns `true` for a POST whose content type starts with `application/grpc-web`.
///
/// Only the request head is read.
pub fn is_grpc_web(method: &Method, headers: &HeaderMap) -> bool {
    method == Method::POST && content_type(headers).starts_with(GRPC_WEB)
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Translates gRPC-Web calls into native dispatches on a shared [`RpcDispatcher`].
#[derive(Debug, Clone)]
pub struct GrpcWebAdapter {
    dispatcher: Arc<RpcDispatcher>,
}

impl GrpcWebAdapter {
    /// Wraps `dispatcher`.
    pub fn new(dispatcher: Arc<RpcDispatcher>) -> Self {
        Self { dispatcher }
    }

    async fn unary(
        &self,
        path: &str,
        headers: &HeaderMap,
        body: Body,
        text: bool,
    ) -> Result<Bytes, RpcStatus> {
        let max = self.dispatcher.max_message_bytes();
        let framed_limit = max + HEADER_SIZE;
        let raw = if text {
            let encoded = collect_limited(body, framed_limit.div_ceil(3) * 4 + 4).await?;
            let cleaned: Vec<u8> = encoded
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            Bytes::from(
                STANDARD
                    .decode(cleaned)
                    .map_err(|e| RpcStatus::internal(format!("invalid base64 body: {e}")))?,
            )
        } else {
            collect_limited(body, framed_limit).await?
        };
        let message = decode_unary(raw, max)?;
        self.dispatcher.invoke(path, headers, message).await
    }
}

impl Handler for GrpcWebAdapter {
    fn handle(&self, request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
        Box::pin(async move {
            let text = content_type(request.headers()).starts_with(GRPC_WEB_TEXT);
            let (parts, body) = request.into_parts();
            let path = parts.uri.path();

            let result = self.unary(path, &parts.headers, body, text).await;

            let mut payload = BytesMut::new();
            let status = match result {
                Ok(reply) => {
                    payload.extend_from_slice(&encode_message(&reply));
                    RpcStatus::ok()
                }
                Err(status) => {
                    debug!(method = path, %status, "grpc-web call failed");
                    status
                }
            };
            payload.extend_from_slice(&encode_frame(
                TRAILER_FLAG,
                status.to_trailer_block().as_bytes(),
            ));

            let (body, response_type) = if text {
                (full(STANDARD.encode(&payload)), "application/grpc-web-text+proto")
            } else {
                (full(payload.freeze()), "application/grpc-web+proto")
            };

            let mut response = http::Response::new(body);
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(response_type));
            headers.insert(
                ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_static(EXPOSED_HEADERS),
            );
            if !status.code().is_ok() {
                status.write_to(headers);
            }
            response
        })
    }
}

impl WebRpcHandler for GrpcWebAdapter {
    fn is_web_rpc_request(&self, request: &HttpRequest) -> bool {
        is_grpc_web(request.method(), request.headers())
    }
}
