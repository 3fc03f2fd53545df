//! Reactrpc
//!
//! Client side of a length-prefixed binary RPC protocol. Every call opens one
//! connection (TCP or Unix socket, optionally TLS), sends one request frame,
//! waits for one response frame and hands the result back to the caller.
//!
//! All socket I/O runs on a single cooperative reactor shared by any number of
//! [`client::Client`] instances. Calls can be made with a callback, blocking
//! from a worker thread, or awaited from inside reactor tasks.

pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod models;
pub mod transport;

pub use client::{Client, ClientBuilder, Reactor, ReactorConfig};
pub use config::settings::ConnectionConfig;

/// Error taxonomy surfaced to callers, on both the blocking and callback paths.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("SSL error: {message}")]
    Ssl { message: String },

    #[error("Invalid object: {message}")]
    InvalidObject { message: String },

    #[error("Invalid method: {message}")]
    InvalidMethod { message: String },

    #[error("Invalid token: {message}")]
    InvalidToken { message: String },

    #[error("Remote exception: {message}")]
    RemoteException {
        message: String,
        backtrace: Vec<String>,
        #[source]
        cause: Option<Box<RpcError>>,
    },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl RpcError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create an SSL (handshake / certificate) error
    pub fn ssl(message: impl Into<String>) -> Self {
        Self::Ssl {
            message: message.into(),
        }
    }

    pub fn invalid_object(message: impl Into<String>) -> Self {
        Self::InvalidObject {
            message: message.into(),
        }
    }

    pub fn invalid_method(message: impl Into<String>) -> Self {
        Self::InvalidMethod {
            message: message.into(),
        }
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Create a remote exception without backtrace or cause
    pub fn remote_exception(message: impl Into<String>) -> Self {
        Self::RemoteException {
            message: message.into(),
            backtrace: Vec::new(),
            cause: None,
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// The reactor stopped before the call produced a result
    pub fn shut_down() -> Self {
        Self::connection("Connection closed [reactor shut down before the call completed]")
    }

    /// Stable name of the error kind, matching the `kind` field of wire error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Configuration { .. } => "ConfigurationError",
            RpcError::Connection { .. } => "ConnectionError",
            RpcError::Ssl { .. } => "SSLError",
            RpcError::InvalidObject { .. } => "InvalidObjectError",
            RpcError::InvalidMethod { .. } => "InvalidMethodError",
            RpcError::InvalidToken { .. } => "InvalidTokenError",
            RpcError::RemoteException { .. } => "RemoteExceptionError",
            RpcError::Serialization { .. } => "SerializationError",
        }
    }

    /// True for transport failures, SSL failures included
    pub fn is_connection_error(&self) -> bool {
        matches!(self, RpcError::Connection { .. } | RpcError::Ssl { .. })
    }

    pub fn is_ssl_error(&self) -> bool {
        matches!(self, RpcError::Ssl { .. })
    }

    pub fn is_configuration_error(&self) -> bool {
        matches!(self, RpcError::Configuration { .. })
    }

    /// True for failures reported by the remote peer over a working connection
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            RpcError::InvalidObject { .. }
                | RpcError::InvalidMethod { .. }
                | RpcError::InvalidToken { .. }
                | RpcError::RemoteException { .. }
        )
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            RpcError::Configuration { message } => {
                format!("Configuration issue: {}", message)
            }
            RpcError::Connection { message } => {
                format!("Could not reach the server: {}", message)
            }
            RpcError::Ssl { message } => {
                format!("Secure connection failed: {}", message)
            }
            RpcError::InvalidObject { message } => {
                format!("The server does not expose that object: {}", message)
            }
            RpcError::InvalidMethod { message } => {
                format!("The server does not expose that method: {}", message)
            }
            RpcError::InvalidToken { message } => {
                format!("Authentication token rejected: {}", message)
            }
            RpcError::RemoteException { message, cause, .. } => match cause {
                Some(cause) => format!("Remote call failed: {} (caused by: {})", message, cause),
                None => format!("Remote call failed: {}", message),
            },
            RpcError::Serialization { message } => {
                format!("Data format error: {}", message)
            }
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(error: serde_json::Error) -> Self {
        RpcError::serialization(error.to_string())
    }
}

impl From<rmp_serde::encode::Error> for RpcError {
    fn from(error: rmp_serde::encode::Error) -> Self {
        RpcError::serialization(error.to_string())
    }
}

impl From<rmp_serde::decode::Error> for RpcError {
    fn from(error: rmp_serde::decode::Error) -> Self {
        RpcError::serialization(error.to_string())
    }
}

/// Convenience type alias for Results
pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_error_is_connection_error() {
        let err = RpcError::ssl("certificate verify failed");
        assert!(err.is_connection_error());
        assert!(err.is_ssl_error());
        assert!(!err.is_remote());
        assert_eq!(err.kind(), "SSLError");
    }

    #[test]
    fn test_remote_errors() {
        for err in [
            RpcError::invalid_object("bar"),
            RpcError::invalid_method("test.bar"),
            RpcError::invalid_token("nope"),
            RpcError::remote_exception("boom"),
        ] {
            assert!(err.is_remote(), "{} should be remote", err.kind());
            assert!(!err.is_connection_error());
        }
    }

    #[test]
    fn test_user_message_includes_cause() {
        let err = RpcError::RemoteException {
            message: "outer".to_string(),
            backtrace: vec!["server.rs:1".to_string()],
            cause: Some(Box::new(RpcError::remote_exception("inner"))),
        };

        let message = err.user_message();
        assert!(message.contains("outer"));
        assert!(message.contains("inner"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: RpcError = parse.unwrap_err().into();
        assert_eq!(err.kind(), "SerializationError");
    }
}
