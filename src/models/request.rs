use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::{RpcError, RpcResult};

/// Completion callback invoked with the final result of a call
pub type Callback = Box<dyn FnOnce(RpcResult<Value>) + Send + 'static>;

/// One-shot result slot shared between a request and its deadline timer.
///
/// Whichever side resolves first takes the callback; later resolutions are
/// dropped, so the caller observes exactly one result. When the last clone
/// goes away unresolved, the callback receives a ConnectionError.
#[derive(Clone)]
pub struct Completion {
    slot: Arc<Slot>,
}

struct Slot(Mutex<Option<Callback>>);

impl Drop for Slot {
    fn drop(&mut self) {
        let callback = self
            .0
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(callback) = callback {
            debug!("Call abandoned before completion");
            callback(Err(RpcError::shut_down()));
        }
    }
}

impl Completion {
    pub fn new(callback: Callback) -> Self {
        Self {
            slot: Arc::new(Slot(Mutex::new(Some(callback)))),
        }
    }

    /// Take the callback out of the slot, if nobody did yet
    pub fn take(&self) -> Option<Callback> {
        let mut slot = self.slot.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.take()
    }

    pub fn is_resolved(&self) -> bool {
        let slot = self.slot.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.is_none()
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// A single method call, from `Client` construction to callback invocation
#[derive(Debug)]
pub struct Request {
    id: Uuid,
    message: String,
    args: Vec<Value>,
    token: Option<String>,
    callback: Option<Completion>,
    defer_callback: bool,
    attempt: u32,
    deadline: Option<Instant>,
}

impl Request {
    pub fn new(message: impl Into<String>, args: Vec<Value>, token: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            message: message.into(),
            args,
            token,
            callback: None,
            defer_callback: true,
            attempt: 0,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Split `<namespace>.<method>` into its two parts.
    ///
    /// The namespace is everything before the last dot.
    pub fn target(&self) -> RpcResult<(&str, &str)> {
        match self.message.rsplit_once('.') {
            Some((namespace, method)) if !namespace.is_empty() && !method.is_empty() => {
                Ok((namespace, method))
            }
            _ => Err(RpcError::configuration(format!(
                "message '{}' must have the form '<namespace>.<method>'",
                self.message
            ))),
        }
    }

    pub fn set_callback(&mut self, callback: Callback) {
        self.callback = Some(Completion::new(callback));
    }

    pub fn completion(&self) -> Option<Completion> {
        self.callback.clone()
    }

    pub fn defers_callback(&self) -> bool {
        self.defer_callback
    }

    pub fn set_defer_callback(&mut self, defer: bool) {
        self.defer_callback = defer;
    }

    /// Keep the callback on the reactor thread
    pub fn do_not_defer(&mut self) {
        self.defer_callback = false;
    }

    pub(crate) fn next_attempt(&mut self) {
        self.attempt += 1;
    }

    /// Payload transmitted to the server
    pub fn frame(&self) -> RequestFrame {
        RequestFrame {
            message: self.message.clone(),
            args: self.args.clone(),
            token: self.token.clone(),
        }
    }
}

/// Wire representation of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub message: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}
