//! Wire error payloads to typed errors

use serde_json::Value;

use crate::models::{ErrorPayload, Reply, Response};
use crate::{RpcError, RpcResult};

/// Maps decoded responses onto `RpcResult`. Pure; no I/O.
pub struct ErrorTranslator;

impl ErrorTranslator {
    /// Turn a response into the caller-visible result
    pub fn translate(response: Response) -> RpcResult<Value> {
        match response.into_reply() {
            Reply::Value(value) => Ok(value),
            Reply::Error(payload) => Err(Self::from_payload(&payload)),
        }
    }

    /// Map a payload by its kind. Unknown kinds are remote exceptions.
    pub fn from_payload(payload: &ErrorPayload) -> RpcError {
        let message = payload.message.clone();

        match payload.kind.as_str() {
            "ConnectionError" => RpcError::connection(message),
            "SSLError" | "SSLPeerVerificationFailed" => RpcError::ssl(message),
            "InvalidObject" | "InvalidObjectError" => RpcError::invalid_object(message),
            "InvalidMethod" | "InvalidMethodError" => RpcError::invalid_method(message),
            "InvalidToken" | "InvalidTokenError" => RpcError::invalid_token(message),
            _ => RpcError::RemoteException {
                message,
                backtrace: payload.backtrace.clone(),
                cause: payload
                    .cause
                    .as_ref()
                    .map(|cause| Box::new(Self::from_payload(cause))),
            },
        }
    }
}
