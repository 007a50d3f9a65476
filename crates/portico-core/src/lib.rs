//! # Portico Core
//!
//! Core types and traits shared by every Portico crate.
//!
//! - [`Body`], [`HttpRequest`], [`HttpResponse`] - the boxed HTTP types every handler speaks
//! - [`CorrelationId`] and [`RequestContext`] - per-request correlation state
//! - [`Handler`] and [`WebRpcHandler`] - the capabilities the multiplexer dispatches to
//! - [`Envelope`] and [`ApiError`] - the JSON envelopes returned by REST handlers

#![doc(html_root_url = "https://docs.rs/portico-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod body;
mod context;
mod envelope;
mod error;
mod handler;

pub use body::{empty, full, json, Body, BoxError, BoxFuture, HttpRequest, HttpResponse};
pub use context::{CorrelationId, RequestContext, CORRELATION_ID_HEADER};
pub use envelope::Envelope;
pub use error::ApiError;
pub use handler::{panic_message, Handler, WebRpcHandler};
