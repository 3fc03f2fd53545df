//! Client-side call machinery
//!
//! A [`Client`] validates its configuration once, then turns each call into a
//! [`Request`](crate::models::Request) that a fresh connection handler carries
//! over the reactor.

pub mod bridge;
pub mod handler;
pub mod reactor;
pub mod retry;
pub mod translate;

pub use bridge::{CallBridge, ExecutionContext, Resumer, TaskResumer, ThreadResumer};
pub use handler::HandlerState;
pub use reactor::{Reactor, ReactorConfig};
pub use retry::{CloseReason, RetryPolicy};
pub use translate::ErrorTranslator;

use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

use crate::codec::{Codec, Serializer};
use crate::config::{validate_configuration, ConnectionConfig};
use crate::models::Request;
use crate::RpcResult;
use handler::Dispatcher;

/// Handle for calling remote objects at one endpoint
///
/// Cheap to share behind an `Arc`; every call opens its own connection.
pub struct Client {
    config: Arc<ConnectionConfig>,
    bridge: CallBridge,
}

impl Client {
    /// Build a client on the process-wide reactor
    pub fn new(config: ConnectionConfig) -> RpcResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ConnectionConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// A request for `message` carrying this client's token and deadline
    pub fn request(&self, message: &str, args: Vec<Value>) -> Request {
        let deadline = self.config.timeout().map(|timeout| Instant::now() + timeout);
        Request::new(message, args, self.config.token.clone()).with_deadline(deadline)
    }

    /// Call `message` and return at once; `callback` gets the result later
    ///
    /// The callback runs on the deferred worker pool.
    pub fn call_with<F>(&self, message: &str, args: Vec<Value>, callback: F)
    where
        F: FnOnce(RpcResult<Value>) + Send + 'static,
    {
        self.submit(self.request(message, args), callback);
    }

    /// Send a prepared request, e.g. one with deferral turned off
    pub fn submit<F>(&self, request: Request, callback: F)
    where
        F: FnOnce(RpcResult<Value>) + Send + 'static,
    {
        self.bridge.call_async(request, Box::new(callback));
    }

    /// Call `message` and block until the result arrives
    ///
    /// Fails with a configuration error when used on the reactor thread;
    /// use [`Client::call`] there instead.
    pub fn call_sync(&self, message: &str, args: Vec<Value>) -> RpcResult<Value> {
        self.bridge.call_blocking(self.request(message, args))
    }

    /// Call `message` and await the result. Works on any runtime, including
    /// inside the reactor.
    pub async fn call(&self, message: &str, args: Vec<Value>) -> RpcResult<Value> {
        self.bridge.call_cooperative(self.request(message, args)).await
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn reactor(&self) -> &Arc<Reactor> {
        self.bridge.reactor()
    }

    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::current(self.reactor())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("reactor", self.reactor())
            .finish()
    }
}

pub struct ClientBuilder {
    config: ConnectionConfig,
    reactor: Option<Arc<Reactor>>,
    codec: Option<Arc<dyn Codec>>,
    strict: bool,
}

impl ClientBuilder {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            reactor: None,
            codec: None,
            strict: false,
        }
    }

    /// Run on a specific reactor instead of the global one
    pub fn reactor(mut self, reactor: Arc<Reactor>) -> Self {
        self.reactor = Some(reactor);
        self
    }

    /// Override the primary codec chosen by `serializer`
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Treat configuration warnings as errors
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Validate everything up front. No network I/O happens here.
    pub fn build(self) -> RpcResult<Client> {
        let config = self.config;
        validate_configuration(&config, self.strict)?;

        let endpoint = config.endpoint()?;
        let tls = config.tls().connector()?;

        let serializer = match self.codec {
            Some(codec) => {
                let serializer = Serializer::new(codec);
                match config.fallback_serializer {
                    Some(fallback) => serializer.with_fallback(fallback.codec()),
                    None => serializer,
                }
            }
            None => Serializer::from_kinds(config.serializer, config.fallback_serializer),
        };

        let retry = RetryPolicy::new(config.max_retries, config.retry_delay());
        let reactor = match self.reactor {
            Some(reactor) => reactor,
            None => Reactor::global()?,
        };

        info!(
            "Client ready for {} ({}, tls: {})",
            endpoint,
            serializer.primary().name(),
            tls.is_some()
        );

        let dispatcher = Dispatcher::new(reactor, endpoint, tls, serializer, retry);
        Ok(Client {
            config: Arc::new(config),
            bridge: CallBridge::new(Arc::new(dispatcher)),
        })
    }
}
