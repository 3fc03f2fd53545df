//! Pluggable serialization for request and response frames
//!
//! A [`Codec`] turns the wire structs into bytes and back. The client only
//! ever encodes requests and decodes responses; the reverse directions exist
//! so peers (and tests) can speak the same format.

pub mod json;
pub mod msgpack;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::models::{RequestFrame, Response, ResponseFrame};
use crate::{RpcError, RpcResult};

pub use json::JsonCodec;
pub use msgpack::MessagePackCodec;

/// Serialization format for frame bodies
pub trait Codec: Send + Sync {
    /// Short name used in logs and configuration
    fn name(&self) -> &'static str;

    fn encode_request(&self, frame: &RequestFrame) -> RpcResult<Vec<u8>>;

    fn decode_request(&self, data: &[u8]) -> RpcResult<RequestFrame>;

    fn encode_response(&self, frame: &ResponseFrame) -> RpcResult<Vec<u8>>;

    fn decode_response_frame(&self, data: &[u8]) -> RpcResult<ResponseFrame>;

    /// Decode a response body and classify it as value or error payload
    fn decode_response(&self, data: &[u8]) -> RpcResult<Response> {
        Ok(self.decode_response_frame(data)?.into_response())
    }
}

/// Built-in codecs selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    #[default]
    Json,
    #[serde(alias = "messagepack")]
    Msgpack,
}

impl SerializerKind {
    pub fn codec(self) -> Arc<dyn Codec> {
        match self {
            SerializerKind::Json => Arc::new(JsonCodec),
            SerializerKind::Msgpack => Arc::new(MessagePackCodec),
        }
    }
}

impl fmt::Display for SerializerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializerKind::Json => write!(f, "json"),
            SerializerKind::Msgpack => write!(f, "msgpack"),
        }
    }
}

impl FromStr for SerializerKind {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(SerializerKind::Json),
            "msgpack" | "messagepack" => Ok(SerializerKind::Msgpack),
            other => Err(RpcError::configuration(format!(
                "Unknown serializer '{}'. Supported: json, msgpack",
                other
            ))),
        }
    }
}

/// Primary codec plus an optional fallback tried when a response cannot be decoded
#[derive(Clone)]
pub struct Serializer {
    primary: Arc<dyn Codec>,
    fallback: Option<Arc<dyn Codec>>,
}

impl Serializer {
    pub fn new(primary: Arc<dyn Codec>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn Codec>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn from_kinds(primary: SerializerKind, fallback: Option<SerializerKind>) -> Self {
        let serializer = Self::new(primary.codec());
        match fallback {
            Some(kind) => serializer.with_fallback(kind.codec()),
            None => serializer,
        }
    }

    pub fn primary(&self) -> &dyn Codec {
        self.primary.as_ref()
    }

    pub fn encode_request(&self, frame: &RequestFrame) -> RpcResult<Vec<u8>> {
        self.primary.encode_request(frame)
    }

    pub fn decode_response(&self, data: &[u8]) -> RpcResult<Response> {
        match self.primary.decode_response(data) {
            Ok(response) => Ok(response),
            Err(primary_err) => match &self.fallback {
                Some(fallback) => {
                    warn!(
                        "{} decoder failed ({}), retrying with fallback {}",
                        self.primary.name(),
                        primary_err,
                        fallback.name()
                    );
                    fallback.decode_response(data)
                }
                None => Err(primary_err),
            },
        }
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new(Arc::new(JsonCodec))
    }
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.as_ref().map(|codec| codec.name()))
            .finish()
    }
}
