use super::Codec;
use crate::models::{RequestFrame, ResponseFrame};
use crate::RpcResult;

/// JSON frame bodies (serde_json)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode_request(&self, frame: &RequestFrame) -> RpcResult<Vec<u8>> {
        Ok(serde_json::to_vec(frame)?)
    }

    fn decode_request(&self, data: &[u8]) -> RpcResult<RequestFrame> {
        Ok(serde_json::from_slice(data)?)
    }

    fn encode_response(&self, frame: &ResponseFrame) -> RpcResult<Vec<u8>> {
        Ok(serde_json::to_vec(frame)?)
    }

    fn decode_response_frame(&self, data: &[u8]) -> RpcResult<ResponseFrame> {
        Ok(serde_json::from_slice(data)?)
    }
}
