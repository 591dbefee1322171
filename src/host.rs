//! # Host Substrate Seam
//!
//! The engine's suspension points delegate durability to a host execution
//! substrate. These traits are that boundary: an event-wait primitive keyed
//! by token and a timer primitive. The in-memory implementations back
//! development and tests; a durable host supplies its own.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Suspend until an event matching `token` arrives or `timeout` elapses.
#[async_trait]
pub trait EventWaiter: Send + Sync {
    async fn wait(&self, token: &str, timeout: Duration) -> Result<JsonValue>;
}

/// Suspend for a fixed duration.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Timer primitive backed by the tokio runtime.
#[derive(Debug, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

struct HubState {
    waiters: HashMap<String, Vec<oneshot::Sender<JsonValue>>>,
    /// Events delivered before anyone was waiting. One buffered payload per
    /// token; redelivery overwrites.
    buffered: HashMap<String, JsonValue>,
}

/// In-process event hub. `deliver` and `wait` synchronize through one lock so
/// an event can never fall between the waiter check and the buffer write.
pub struct InMemoryEventHub {
    state: Mutex<HubState>,
}

impl Default for InMemoryEventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventHub {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HubState {
                waiters: HashMap::new(),
                buffered: HashMap::new(),
            }),
        }
    }

    /// Deliver an event. Wakes every current waiter on the token, or buffers
    /// the payload when nobody is waiting yet.
    pub fn deliver(&self, token: &str, payload: JsonValue) {
        let mut state = self.state.lock();
        match state.waiters.remove(token) {
            Some(senders) => {
                debug!(token = %token, waiters = senders.len(), "delivering event to waiters");
                for sender in senders {
                    let _ = sender.send(payload.clone());
                }
            }
            None => {
                debug!(token = %token, "buffering event; no waiters yet");
                state.buffered.insert(token.to_string(), payload);
            }
        }
    }
}

#[async_trait]
impl EventWaiter for InMemoryEventHub {
    async fn wait(&self, token: &str, timeout: Duration) -> Result<JsonValue> {
        let receiver = {
            let mut state = self.state.lock();
            if let Some(payload) = state.buffered.remove(token) {
                return Ok(payload);
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.entry(token.to_string()).or_default().push(sender);
            receiver
        };

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(EngineError::Store {
                operation: "event_wait".to_string(),
                reason: format!("event channel for '{token}' closed"),
            }),
            Err(_) => Err(EngineError::HookTimeout {
                token: token.to_string(),
                waited_ms: timeout.as_millis() as u64,
            }),
        }
    }
}
