//! # Portico RPC
//!
//! Unary gRPC served two ways from one set of services:
//!
//! - [`RpcDispatcher`] speaks native gRPC over HTTP/2 with real trailers
//! - [`GrpcWebAdapter`] speaks gRPC-Web (binary and base64 text) over any HTTP
//!   version, carrying trailers in the body
//!
//! Services implement [`RpcService`] and exchange prost-encoded messages.
//! [`Greeter`] is the bundled `helloworld.Greeter` service.
//!
//! ## Wire handling
//!
//! | Condition                          | Status               |
//! |------------------------------------|----------------------|
//! | unknown service or method          | `UNIMPLEMENTED`      |
//! | compressed frame                   | `UNIMPLEMENTED`      |
//! | message above the configured limit | `RESOURCE_EXHAUSTED` |
//! | truncated or trailing frames       | `INTERNAL`           |
//! | `grpc-timeout` elapsed             | `DEADLINE_EXCEEDED`  |
//! | service panicked                   | `INTERNAL`           |

#![doc(html_root_url = "https://docs.rs/portico-rpc/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod dispatcher;
mod frame;
mod greeter;
mod metadata;
mod service;
mod status;
mod web;

pub use dispatcher::{RpcDispatcher, RpcDispatcherBuilder, GRPC_CONTENT_TYPE};
pub use frame::{
    decode_unary, encode_frame, encode_message, FrameError, HEADER_SIZE, MAX_MESSAGE_SIZE,
    TRAILER_FLAG,
};
pub use greeter::{Greeter, HelloReply, HelloRequest};
pub use metadata::{CallContext, Timeout, GRPC_TIMEOUT};
pub use service::{decode_request, encode_reply, RpcService};
pub use status::{Code, RpcStatus, GRPC_MESSAGE, GRPC_STATUS};
pub use web::{is_grpc_web, GrpcWebAdapter, GRPC_WEB, GRPC_WEB_TEXT};
