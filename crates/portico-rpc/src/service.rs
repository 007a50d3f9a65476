//! Service capability.

use bytes::Bytes;
use portico_core::BoxFuture;

use crate::metadata::CallContext;
use crate::status::RpcStatus;

/// A set of unary methods registered under one fully-qualified service name.
///
/// Implementations receive the decoded message bytes and return the encoded
/// reply; framing, deadlines and status reporting belong to the dispatcher.
pub trait RpcService: Send + Sync + 'static {
    /// Fully-qualified service name, e.g. `helloworld.Greeter`.
    fn name(&self) -> &'static str;

    /// Invokes `method` (the bare method name, e.g. `SayHello`).
    ///
    /// Unknown methods should return [`RpcStatus::unimplemented`].
    fn call<'a>(
        &'a self,
        method: &'a str,
        ctx: CallContext,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<Bytes, RpcStatus>>;
}

/// Decodes a protobuf request message.
pub fn decode_request<M: prost::Message + Default>(payload: &Bytes) -> Result<M, RpcStatus> {
    M::decode(payload.clone()).map_err(RpcStatus::from)
}

/// Encodes a protobuf reply message.
pub fn encode_reply<M: prost::Message>(reply: &M) -> Bytes {
    Bytes::from(reply.encode_to_vec())
}
