//! [`HandoffBridge`] – producer-thread side of the relay inbox.
//!
//! The bridge is created detached and handed to the producer before the
//! relay starts.  The relay attaches its inbox when its loop begins; until
//! then every submission is dropped rather than queued.
//!
//! [`HandoffBridge::submit`] is a plain function (no `.await`), safe to call
//! from any OS thread, and never blocks: the inbox is unbounded.

use std::sync::{Arc, OnceLock};

use meshrelay_types::{NodeEvent, RelayError};
use tokio::sync::mpsc;
use tracing::trace;

/// Cloneable, thread-safe submission handle into the relay consumer.
#[derive(Clone, Debug, Default)]
pub struct HandoffBridge {
    inbox: Arc<OnceLock<mpsc::UnboundedSender<NodeEvent>>>,
}

impl HandoffBridge {
    /// A bridge with no consumer yet.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Connect the bridge to the consumer's inbox.  A bridge can be attached
    /// exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Channel`] if the bridge is already attached.
    pub fn attach(&self, inbox: mpsc::UnboundedSender<NodeEvent>) -> Result<(), RelayError> {
        self.inbox
            .set(inbox)
            .map_err(|_| RelayError::Channel("handoff bridge is already attached".to_string()))
    }

    /// `true` while a live consumer is attached.
    pub fn is_attached(&self) -> bool {
        self.inbox.get().is_some_and(|tx| !tx.is_closed())
    }

    /// Enqueue `event` for the consumer.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConsumerUnavailable`] when the consumer has not
    /// started yet or has already shut down.  The event is dropped.
    pub fn submit(&self, event: NodeEvent) -> Result<(), RelayError> {
        let Some(inbox) = self.inbox.get() else {
            trace!(node = %event.node(), "consumer not started; dropping event");
            return Err(RelayError::ConsumerUnavailable);
        };
        inbox.send(event).map_err(|_| RelayError::ConsumerUnavailable)
    }
}
