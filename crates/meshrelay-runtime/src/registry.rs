//! Subscriber registry and the sink seam every push connection sits behind.

use std::collections::HashMap;
use std::collections::hash_map;
use std::fmt;

use async_trait::async_trait;
use meshrelay_types::{OutboundFrame, RelayError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::fanout::{self, FanoutReport};

// ─────────────────────────────────────────────────────────────────────────────
// SubscriberId
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque identity of one push-channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sinks
// ─────────────────────────────────────────────────────────────────────────────

/// Destination for encoded frames.
///
/// # Contract
///
/// * `send` – deliver one JSON text frame.  Any `Err` means the subscriber
///   is gone; the registry removes it and never retries.
#[async_trait]
pub trait SubscriberSink: Send + Sync {
    /// Deliver one encoded frame.
    async fn send(&self, frame: &str) -> Result<(), RelayError>;
}

/// Sink that forwards frames to a connection's writer task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    /// Create a sink and the receiver the writer task drains.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SubscriberSink for ChannelSink {
    async fn send(&self, frame: &str) -> Result<(), RelayError> {
        self.tx
            .send(frame.to_owned())
            .map_err(|_| RelayError::SubscriberClosed("connection writer has exited".to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SubscriberRegistry
// ─────────────────────────────────────────────────────────────────────────────

/// Live push-channel subscribers.  Owned by the relay consumer.
///
/// Every change to the set republishes the count on a `watch` channel so
/// the status endpoint can read it without going through the consumer.
pub struct SubscriberRegistry {
    subscribers: HashMap<SubscriberId, Box<dyn SubscriberSink>>,
    count: watch::Sender<usize>,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            subscribers: HashMap::new(),
            count,
        }
    }

    /// Add `sink` under `id`, replacing any sink already registered there.
    pub fn register(&mut self, id: SubscriberId, sink: Box<dyn SubscriberSink>) {
        self.subscribers.insert(id, sink);
        self.publish_count();
        info!(subscriber = %id, clients = self.subscribers.len(), "subscriber registered");
    }

    /// Remove `id`.  Returns `false` if it was not registered.
    pub fn unregister(&mut self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            self.publish_count();
            info!(subscriber = %id, clients = self.subscribers.len(), "subscriber removed");
        }
        removed
    }

    /// Remove every id in `ids`, returning how many were registered.
    pub fn remove_all(&mut self, ids: &[SubscriberId]) -> usize {
        let removed = ids
            .iter()
            .filter(|id| self.subscribers.remove(*id).is_some())
            .count();
        if removed > 0 {
            self.publish_count();
            info!(removed, clients = self.subscribers.len(), "pruned failed subscribers");
        }
        removed
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Receiver that observes the subscriber count.
    pub fn watch_count(&self) -> watch::Receiver<usize> {
        self.count.subscribe()
    }

    /// Send `frame` to a single subscriber, removing it on failure.
    /// Returns `true` when the frame was delivered.
    pub async fn send_to(&mut self, id: SubscriberId, frame: &OutboundFrame) -> bool {
        let Some(sink) = self.subscribers.get(&id) else {
            return false;
        };
        let payload = match frame.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                debug!(subscriber = %id, error = %e, "failed to encode frame");
                return false;
            }
        };
        let result = sink.send(&payload).await;
        match result {
            Ok(()) => true,
            Err(e) => {
                debug!(subscriber = %id, error = %e, "send failed");
                self.unregister(id);
                false
            }
        }
    }

    /// Ping every subscriber, pruning those that fail.
    pub async fn keep_alive(&mut self) -> FanoutReport {
        fanout::broadcast(self, &OutboundFrame::Ping).await
    }

    pub(crate) fn iter(&self) -> hash_map::Iter<'_, SubscriberId, Box<dyn SubscriberSink>> {
        self.subscribers.iter()
    }

    fn publish_count(&self) {
        self.count.send_replace(self.subscribers.len());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
