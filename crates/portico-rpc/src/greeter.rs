//! `helloworld.Greeter`, the sample service.

use bytes::Bytes;
use portico_core::BoxFuture;

use crate::metadata::CallContext;
use crate::service::{decode_request, encode_reply, RpcService};
use crate::status::RpcStatus;

/// Request message of `SayHello`.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct HelloRequest {
    /// Name to greet.
    #[prost(string, tag = "1")]
    pub name: String,
}

/// Reply message of `SayHello`.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct HelloReply {
    /// The greeting.
    #[prost(string, tag = "1")]
    pub message: String,
}

/// Greets callers by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct Greeter;

impl Greeter {
    /// Fully-qualified service name.
    pub const NAME: &'static str = "helloworld.Greeter";

    /// Creates the service.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// `SayHello`.
    pub fn say_hello(&self, request: HelloRequest) -> HelloReply {
        HelloReply {
            message: format!("Hello there, {}", request.name),
        }
    }
}

impl RpcService for Greeter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn call<'a>(
        &'a self,
        method: &'a str,
        _ctx: CallContext,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<Bytes, RpcStatus>> {
        Box::pin(async move {
            match method {
                "SayHello" => {
                    let request: HelloRequest = decode_request(&payload)?;
                    tracing::debug!(name = %request.name, "SayHello");
                    Ok(encode_reply(&self.say_hello(request)))
                }
                _ => Err(RpcStatus::unimplemented(format!(
                    "unknown method {method} for service {}",
                    Self::NAME
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_say_hello() {
        let reply = Greeter::new().say_hello(HelloRequest {
            name: "world".to_string(),
        });
        assert_eq!(reply.message, "Hello there, world");
    }

    #[tokio::test]
    async fn test_call_decodes_and_encodes() {
        let payload = Bytes::from(
            HelloRequest {
                name: "Ada".to_string(),
            }
            .encode_to_vec(),
        );
        let reply = Greeter::new()
            .call("SayHello", CallContext::detached("/helloworld.Greeter/SayHello"), payload)
            .await
            .unwrap();
        assert_eq!(HelloReply::decode(reply).unwrap().message, "Hello there, Ada");
    }

    #[tokio::test]
    async fn test_garbage_payload_is_internal() {
        let err = Greeter::new()
            .call(
                "SayHello",
                CallContext::detached("/helloworld.Greeter/SayHello"),
                Bytes::from_static(&[0xff, 0xff, 0xff]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::Code::Internal);
    }
}
