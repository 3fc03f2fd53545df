//! Per-call connection state machine and the retry loop that drives it
//!
//! ```text
//! idle -> active -> established -> pending -> done
//!   \________\___________\____________\-----> closed
//! ```
//!
//! One handler owns one socket and one request. A refused connection hands the
//! request back to the dispatcher, which waits on the reactor's timer and
//! starts a fresh handler with the next attempt number.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout_at;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument, warn, Instrument};

use super::reactor::{ConnectionGuard, Reactor};
use super::retry::{CloseReason, RetryPolicy};
use super::translate::ErrorTranslator;
use crate::codec::Serializer;
use crate::models::{Completion, Request, Response};
use crate::transport::{tls, BoxedStream, Endpoint, FramedTransport, Transport};
use crate::{RpcError, RpcResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Idle,
    Active,
    Established,
    Pending,
    Done,
    Closed,
}

/// What the dispatcher should do once a handler finishes
pub(crate) enum Outcome {
    /// The request's result has been handed to its callback
    Delivered,
    /// Reconnect after the delay with the same request
    Retry(Request, Duration),
}

/// Everything a handler needs that is shared by all calls of one client
pub(crate) struct Dispatcher {
    reactor: Arc<Reactor>,
    endpoint: Endpoint,
    tls: Option<TlsConnector>,
    serializer: Serializer,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub(crate) fn new(
        reactor: Arc<Reactor>,
        endpoint: Endpoint,
        tls: Option<TlsConnector>,
        serializer: Serializer,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            reactor,
            endpoint,
            tls,
            serializer,
            retry,
        }
    }

    pub(crate) fn reactor(&self) -> &Arc<Reactor> {
        &self.reactor
    }

    /// Hand a request to the reactor. Returns immediately.
    pub(crate) fn schedule(self: &Arc<Self>, request: Request) {
        let dispatcher = Arc::clone(self);
        drop(self.reactor.spawn(dispatcher.dispatch(request)));
    }

    #[instrument(name = "call", skip_all, fields(request_id = %request.id(), message = request.message()))]
    async fn dispatch(self: Arc<Self>, request: Request) {
        let completion = request.completion();
        let defer = request.defers_callback();

        if let Err(e) = request.target() {
            deliver(&self.reactor, completion, defer, Err(e));
            return;
        }

        match request.deadline() {
            Some(deadline) => {
                let id = request.id();
                let attempts = Arc::clone(&self).run_attempts(request);
                if timeout_at(deadline, attempts).await.is_err() {
                    warn!(request_id = %id, "Call to {} timed out", self.endpoint);
                    let error = RpcError::connection(format!(
                        "Connection closed [call to {} timed out]",
                        self.endpoint
                    ));
                    deliver(&self.reactor, completion, defer, Err(error));
                }
            }
            None => self.run_attempts(request).await,
        }
    }

    /// Strictly sequential attempts; at most one handler alive per request
    async fn run_attempts(self: Arc<Self>, mut request: Request) {
        loop {
            let span = tracing::debug_span!(
                "connection",
                request_id = %request.id(),
                attempt = request.attempt()
            );
            let handler = ConnectionHandler::new(Arc::clone(&self), request);

            match handler.run().instrument(span).await {
                Outcome::Delivered => return,
                Outcome::Retry(mut next, delay) => {
                    tokio::time::sleep(delay).await;
                    next.next_attempt();
                    request = next;
                }
            }
        }
    }
}

/// Hand a result to the request's callback, on the deferred pool if requested
pub(crate) fn deliver(
    reactor: &Reactor,
    completion: Option<Completion>,
    defer: bool,
    result: RpcResult<Value>,
) {
    let Some(callback) = completion.and_then(|completion| completion.take()) else {
        debug!("Result dropped: no callback waiting");
        return;
    };

    if defer {
        reactor.defer(move || callback(result));
    } else {
        callback(result);
    }
}

pub(crate) struct ConnectionHandler {
    dispatcher: Arc<Dispatcher>,
    state: HandlerState,
    request: Option<Request>,
    transport: Option<FramedTransport<BoxedStream>>,
    _registration: ConnectionGuard,
}

impl ConnectionHandler {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>, request: Request) -> Self {
        let registration = dispatcher.reactor.register_connection();
        Self {
            dispatcher,
            state: HandlerState::Idle,
            request: Some(request),
            transport: None,
            _registration: registration,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> HandlerState {
        self.state
    }

    /// Drive one attempt from socket construction to delivery or closure
    pub(crate) async fn run(mut self) -> Outcome {
        let stream = match self.post_init().await {
            Ok(stream) => stream,
            Err(reason) => return self.unbind(reason),
        };
        self.connection_completed();

        let stream = match self.start_tls(stream).await {
            Ok(stream) => stream,
            Err(reason) => return self.unbind(reason),
        };
        self.transport = Some(FramedTransport::new(
            stream,
            self.dispatcher.endpoint.to_string(),
        ));

        if let Err(reason) = self.send_request().await {
            return self.unbind(reason);
        }

        let response = match self.read_response().await {
            Ok(response) => response,
            Err(reason) => return self.unbind(reason),
        };

        self.receive_response(response);
        self.close_connection().await;
        Outcome::Delivered
    }

    async fn post_init(&mut self) -> Result<BoxedStream, CloseReason> {
        self.state = HandlerState::Active;
        debug!("Connecting to {}", self.dispatcher.endpoint);

        self.dispatcher
            .endpoint
            .open()
            .await
            .map_err(CloseReason::from_connect)
    }

    fn connection_completed(&mut self) {
        self.state = HandlerState::Established;
        debug!("Connected to {}", self.dispatcher.endpoint);
    }

    async fn start_tls(&mut self, stream: BoxedStream) -> Result<BoxedStream, CloseReason> {
        let Some(connector) = &self.dispatcher.tls else {
            return Ok(stream);
        };

        let server_name = self.dispatcher.endpoint.server_name().to_string();
        let stream = tls::handshake(connector, &server_name, stream)
            .await
            .map_err(CloseReason::Tls)?;
        debug!("TLS handshake with {} complete", server_name);
        Ok(stream)
    }

    async fn send_request(&mut self) -> Result<(), CloseReason> {
        self.state = HandlerState::Pending;

        let body = match &self.request {
            Some(request) => self
                .dispatcher
                .serializer
                .encode_request(&request.frame())
                .map_err(|e| CloseReason::Codec(e.to_string()))?,
            None => return Err(CloseReason::Codec("no request to send".to_string())),
        };

        let transport = self.transport.as_mut().ok_or_else(not_connected)?;
        transport.write_frame(&body).await.map_err(CloseReason::Io)?;

        debug!("Request sent to {} ({} bytes)", transport.description(), body.len());
        Ok(())
    }

    async fn read_response(&mut self) -> Result<Response, CloseReason> {
        let transport = self.transport.as_mut().ok_or_else(not_connected)?;
        let body = transport.read_frame().await.map_err(CloseReason::Io)?;

        self.dispatcher
            .serializer
            .decode_response(&body)
            .map_err(|e| CloseReason::Codec(e.to_string()))
    }

    fn receive_response(&mut self, response: Response) {
        self.state = HandlerState::Done;

        let Some(request) = self.request.take() else {
            return;
        };

        if response.is_error() {
            debug!("Received error payload for {}", request.message());
        }
        let result = ErrorTranslator::translate(response);
        deliver(
            &self.dispatcher.reactor,
            request.completion(),
            request.defers_callback(),
            result,
        );
    }

    async fn close_connection(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if let Err(e) = transport.close().await {
            // Already delivered; this is ignored by unbind
            let _ = self.unbind(CloseReason::Io(e));
        }
    }

    /// Transport closed. Retry, fail the request, or ignore if already done.
    fn unbind(&mut self, reason: CloseReason) -> Outcome {
        if self.state == HandlerState::Done {
            debug!("Ignoring close after response: {}", reason);
            return Outcome::Delivered;
        }

        let previous = self.state;
        self.state = HandlerState::Closed;

        let Some(request) = self.request.take() else {
            return Outcome::Delivered;
        };

        if let Some(delay) = self.dispatcher.retry.next_delay(request.attempt(), &reason) {
            warn!(
                "Attempt {} to {} failed ({}), retrying in {:?}",
                request.attempt() + 1,
                self.dispatcher.endpoint,
                reason,
                delay
            );
            return Outcome::Retry(request, delay);
        }

        debug!("Connection closed while {:?}: {}", previous, reason);
        let attempts = request.attempt() + 1;
        let error = match reason {
            CloseReason::Tls(e) => RpcError::ssl(format!("{} ({})", e, self.dispatcher.endpoint)),
            CloseReason::Codec(message) => RpcError::serialization(message),
            other => RpcError::connection(format!(
                "Connection closed [{}] for {} after {} attempt{}",
                other,
                self.dispatcher.endpoint,
                attempts,
                if attempts == 1 { "" } else { "s" }
            )),
        };

        deliver(
            &self.dispatcher.reactor,
            request.completion(),
            request.defers_callback(),
            Err(error),
        );
        Outcome::Delivered
    }
}

fn not_connected() -> CloseReason {
    CloseReason::Io(std::io::Error::from(std::io::ErrorKind::NotConnected))
}
