//! Three ways to wait for a call: a callback, a blocked worker thread, or an
//! awaited task on the reactor itself.

use serde_json::Value;
use std::sync::{mpsc, Arc};
use tokio::sync::oneshot;
use tracing::debug;

use super::handler::Dispatcher;
use super::reactor::Reactor;
use crate::models::{Callback, Request};
use crate::{RpcError, RpcResult};

/// Where the caller of a synchronous-looking call is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    /// The reactor's own thread; blocking here stalls all I/O
    Reactor,
    /// Any other thread
    Worker,
}

impl ExecutionContext {
    pub fn current(reactor: &Reactor) -> Self {
        if reactor.on_reactor_thread() {
            ExecutionContext::Reactor
        } else {
            ExecutionContext::Worker
        }
    }
}

/// Suspends a caller until its request completes
pub trait Resumer {
    /// Adjust the request before it is scheduled
    fn prepare(&self, _request: &mut Request) {}

    /// The callback that wakes the suspended caller. Called once.
    fn callback(&mut self) -> Callback;
}

/// Parks the calling OS thread on a channel
pub struct ThreadResumer {
    sender: Option<mpsc::Sender<RpcResult<Value>>>,
    receiver: mpsc::Receiver<RpcResult<Value>>,
}

impl ThreadResumer {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender: Some(sender),
            receiver,
        }
    }

    pub fn wait(self) -> RpcResult<Value> {
        drop(self.sender);
        self.receiver.recv().unwrap_or_else(|_| Err(RpcError::shut_down()))
    }
}

impl Default for ThreadResumer {
    fn default() -> Self {
        Self::new()
    }
}

impl Resumer for ThreadResumer {
    /// The blocked caller may itself hold a pool thread
    fn prepare(&self, request: &mut Request) {
        request.do_not_defer();
    }

    fn callback(&mut self) -> Callback {
        let sender = self.sender.take();
        Box::new(move |result| {
            if let Some(sender) = sender {
                let _ = sender.send(result);
            }
        })
    }
}

/// Suspends an async task; the reactor keeps running while it waits
pub struct TaskResumer {
    sender: Option<oneshot::Sender<RpcResult<Value>>>,
    receiver: oneshot::Receiver<RpcResult<Value>>,
}

impl TaskResumer {
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            sender: Some(sender),
            receiver,
        }
    }

    pub async fn wait(self) -> RpcResult<Value> {
        drop(self.sender);
        self.receiver.await.unwrap_or_else(|_| Err(RpcError::shut_down()))
    }
}

impl Default for TaskResumer {
    fn default() -> Self {
        Self::new()
    }
}

impl Resumer for TaskResumer {
    /// Waking a task is cheap and must happen on the reactor, not the pool
    fn prepare(&self, request: &mut Request) {
        request.do_not_defer();
    }

    fn callback(&mut self) -> Callback {
        let sender = self.sender.take();
        Box::new(move |result| {
            if let Some(sender) = sender {
                let _ = sender.send(result);
            }
        })
    }
}

/// Schedules requests on the reactor and connects them to their callers
pub struct CallBridge {
    dispatcher: Arc<Dispatcher>,
}

impl CallBridge {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn reactor(&self) -> &Arc<Reactor> {
        self.dispatcher.reactor()
    }

    /// Schedule and return immediately; the callback runs exactly once
    pub fn call_async(&self, mut request: Request, callback: Callback) {
        request.set_callback(callback);
        self.dispatcher.schedule(request);
    }

    /// Block the current worker thread until the result arrives
    pub fn call_blocking(&self, request: Request) -> RpcResult<Value> {
        if ExecutionContext::current(self.reactor()) == ExecutionContext::Reactor {
            return Err(RpcError::configuration(
                "call_sync would block the reactor thread; use `call().await` or `call_with` inside the reactor",
            ));
        }

        let mut resumer = ThreadResumer::new();
        self.submit(request, &mut resumer);
        resumer.wait()
    }

    /// Await the result without blocking the thread. Safe on the reactor.
    pub async fn call_cooperative(&self, request: Request) -> RpcResult<Value> {
        let mut resumer = TaskResumer::new();
        self.submit(request, &mut resumer);
        resumer.wait().await
    }

    fn submit<R: Resumer>(&self, mut request: Request, resumer: &mut R) {
        debug!(request_id = %request.id(), "Submitting {}", request.message());
        resumer.prepare(&mut request);
        request.set_callback(resumer.callback());
        self.dispatcher.schedule(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_thread_resumer_wakes_with_result() {
        let mut resumer = ThreadResumer::new();
        let callback = resumer.callback();
        std::thread::spawn(move || callback(Ok(json!(42))));
        assert_eq!(resumer.wait().unwrap(), json!(42));
    }

    #[test]
    fn test_thread_resumer_forces_inline_delivery() {
        let resumer = ThreadResumer::new();
        let mut request = Request::new("test.foo", vec![], None);

        resumer.prepare(&mut request);
        assert!(!request.defers_callback());
    }

    #[test]
    fn test_dropped_callback_is_connection_error() {
        let mut resumer = ThreadResumer::new();
        drop(resumer.callback());
        assert!(resumer.wait().unwrap_err().is_connection_error());
    }

    #[tokio::test]
    async fn test_task_resumer_forces_inline_delivery() {
        let mut resumer = TaskResumer::new();
        let mut request = Request::new("test.foo", vec![], None);
        assert!(request.defers_callback());

        resumer.prepare(&mut request);
        assert!(!request.defers_callback());

        let callback = resumer.callback();
        callback(Err(RpcError::invalid_method("nope")));
        assert_eq!(resumer.wait().await.unwrap_err().kind(), "InvalidMethodError");
    }

    #[test]
    fn test_execution_context() {
        let reactor = Reactor::start(Default::default()).unwrap();
        assert_eq!(ExecutionContext::current(&reactor), ExecutionContext::Worker);

        let inner = reactor.clone();
        let context =
            tokio_test::block_on(reactor.spawn(async move { ExecutionContext::current(&inner) }))
                .unwrap();
        assert_eq!(context, ExecutionContext::Reactor);
    }
}
