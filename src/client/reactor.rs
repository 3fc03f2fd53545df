//! The reactor: one cooperative event loop that owns all socket I/O
//!
//! A reactor is a current-thread tokio runtime parked on its own OS thread.
//! Every connection handler runs as a task on it. Slow callbacks can be
//! deferred to the runtime's bounded blocking pool.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::{RpcError, RpcResult};

/// Default size of the deferred-callback pool
pub const DEFAULT_DEFERRED_WORKERS: usize = 20;

static GLOBAL: OnceLock<Arc<Reactor>> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct ReactorConfig {
    pub thread_name: String,
    /// Upper bound on threads running deferred callbacks
    pub deferred_workers: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            thread_name: "reactrpc-reactor".to_string(),
            deferred_workers: DEFAULT_DEFERRED_WORKERS,
        }
    }
}

pub struct Reactor {
    handle: Handle,
    thread_id: ThreadId,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    connections: AtomicUsize,
}

impl Reactor {
    /// Start an isolated reactor on a new thread
    pub fn start(config: ReactorConfig) -> RpcResult<Arc<Self>> {
        if config.deferred_workers == 0 {
            return Err(RpcError::configuration("deferred_workers must be greater than 0"));
        }

        let runtime = Builder::new_current_thread()
            .enable_all()
            .max_blocking_threads(config.deferred_workers)
            .thread_name(format!("{}-deferred", config.thread_name))
            .build()
            .map_err(|e| RpcError::configuration(format!("failed to build reactor runtime: {}", e)))?;
        let handle = runtime.handle().clone();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                debug!("Reactor loop exited");
            })
            .map_err(|e| RpcError::configuration(format!("failed to spawn reactor thread: {}", e)))?;

        info!(
            "Reactor '{}' started ({} deferred workers)",
            config.thread_name, config.deferred_workers
        );

        Ok(Arc::new(Self {
            handle,
            thread_id: thread.thread().id(),
            shutdown: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
            connections: AtomicUsize::new(0),
        }))
    }

    /// The process-wide reactor, started on first use
    pub fn global() -> RpcResult<Arc<Self>> {
        if let Some(reactor) = GLOBAL.get() {
            return Ok(reactor.clone());
        }

        let started = Self::start(ReactorConfig::default())?;
        // Another thread may have won the race; its reactor is kept and ours is dropped
        Ok(GLOBAL.get_or_init(|| started).clone())
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// True when called from the reactor's own thread
    pub fn on_reactor_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Run a future in the reactor's execution context
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Run a closure on the deferred worker pool
    pub fn defer<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        drop(self.handle.spawn_blocking(work));
    }

    /// Number of connection handlers currently alive
    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub(crate) fn register_connection(self: &Arc<Self>) -> ConnectionGuard {
        self.connections.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            reactor: Arc::clone(self),
        }
    }

    pub fn is_running(&self) -> bool {
        let thread = self.thread.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        thread.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Stop the loop and, from a plain thread, wait for it to exit.
    /// Pending calls resolve with a ConnectionError.
    pub fn shutdown(&self) {
        let sender = self
            .shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(());
            info!("Reactor shutdown requested");
        }

        // Neither the loop nor its deferred pool can wait for the loop to exit
        if self.on_reactor_thread() || Handle::try_current().is_ok() {
            return;
        }

        let thread = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                warn!("Reactor thread panicked during shutdown");
            }
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("thread_id", &self.thread_id)
            .field("active_connections", &self.active_connections())
            .finish()
    }
}

/// Keeps a handler counted in the reactor's connection registry
pub(crate) struct ConnectionGuard {
    reactor: Arc<Reactor>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.reactor.connections.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_thread_detection() {
        let reactor = Reactor::start(ReactorConfig::default()).unwrap();
        assert!(!reactor.on_reactor_thread());

        let inner = reactor.clone();
        let on_reactor = tokio_test::block_on(reactor.spawn(async move { inner.on_reactor_thread() }))
            .unwrap();
        assert!(on_reactor);
    }

    #[test]
    fn test_defer_runs_off_reactor_thread() {
        let reactor = Reactor::start(ReactorConfig::default()).unwrap();
        let (tx, rx) = mpsc::channel();

        let inner = reactor.clone();
        reactor.defer(move || {
            tx.send(inner.on_reactor_thread()).unwrap();
        });

        let on_reactor = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!on_reactor);
    }

    #[test]
    fn test_connection_registry() {
        let reactor = Reactor::start(ReactorConfig::default()).unwrap();
        let guard = reactor.register_connection();
        assert_eq!(reactor.active_connections(), 1);
        drop(guard);
        assert_eq!(reactor.active_connections(), 0);
    }

    #[test]
    fn test_shutdown_stops_thread() {
        let reactor = Reactor::start(ReactorConfig::default()).unwrap();
        assert!(reactor.is_running());
        reactor.shutdown();
        assert!(!reactor.is_running());
    }

    #[test]
    fn test_global_is_shared() {
        let a = Reactor::global().unwrap();
        let b = Reactor::global().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = ReactorConfig {
            deferred_workers: 0,
            ..Default::default()
        };
        assert!(Reactor::start(config).unwrap_err().is_configuration_error());
    }
}
