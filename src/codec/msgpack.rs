use super::Codec;
use crate::models::{RequestFrame, ResponseFrame};
use crate::RpcResult;

/// MessagePack frame bodies (rmp-serde, named struct fields)
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackCodec;

impl Codec for MessagePackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn encode_request(&self, frame: &RequestFrame) -> RpcResult<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(frame)?)
    }

    fn decode_request(&self, data: &[u8]) -> RpcResult<RequestFrame> {
        Ok(rmp_serde::from_slice(data)?)
    }

    fn encode_response(&self, frame: &ResponseFrame) -> RpcResult<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(frame)?)
    }

    fn decode_response_frame(&self, data: &[u8]) -> RpcResult<ResponseFrame> {
        Ok(rmp_serde::from_slice(data)?)
    }
}
