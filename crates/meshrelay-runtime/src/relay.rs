//! [`Relay`] – the single consumer that owns every piece of mutable relay
//! state.
//!
//! One `select!` loop multiplexes:
//!
//! * node events arriving through the [`HandoffBridge`],
//! * flush signals posted by expired debounce timers,
//! * register / unregister commands from push-channel connections,
//! * the keep-alive interval,
//! * the shutdown watch.
//!
//! Buffers, timers and the subscriber registry are only ever touched from
//! inside this loop.

use std::time::Duration;

use meshrelay_middleware::HandoffBridge;
use meshrelay_types::{MergedEvent, NodeEvent, OutboundFrame, RelayError, SensorFrame};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::buffer::{BufferStore, NodeBufferEntry};
use crate::debounce::{DebounceScheduler, FlushSignal};
use crate::fanout;
use crate::registry::{SubscriberId, SubscriberRegistry, SubscriberSink};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Quiet period after a node's last update before its merged event is sent.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);
/// Interval between keep-alive pings.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(10);

/// Timing knobs for a [`Relay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Quiet period per node; each update restarts it.
    pub debounce: Duration,
    /// Keep-alive ping period.  Must be non-zero.
    pub keepalive: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            keepalive: DEFAULT_KEEPALIVE,
        }
    }
}

impl RelayConfig {
    /// Reject settings the consumer loop cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when `keepalive` is zero.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.keepalive.is_zero() {
            return Err(RelayError::Config("keepalive interval must be non-zero".to_string()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RelayHandle
// ─────────────────────────────────────────────────────────────────────────────

/// Requests from connection tasks to the relay.
pub enum RelayCommand {
    Register {
        id: SubscriberId,
        sink: Box<dyn SubscriberSink>,
    },
    Unregister(SubscriberId),
}

/// Cloneable handle used by the push-channel server.
#[derive(Clone)]
pub struct RelayHandle {
    commands: mpsc::UnboundedSender<RelayCommand>,
    clients: watch::Receiver<usize>,
}

impl RelayHandle {
    /// Add a subscriber.  It receives an immediate ping followed by every
    /// subsequent broadcast.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConsumerUnavailable`] when the relay has stopped.
    pub fn register(&self, sink: impl SubscriberSink + 'static) -> Result<SubscriberId, RelayError> {
        let id = SubscriberId::new();
        self.commands
            .send(RelayCommand::Register {
                id,
                sink: Box::new(sink),
            })
            .map_err(|_| RelayError::ConsumerUnavailable)?;
        Ok(id)
    }

    /// Remove a subscriber.  A no-op once the relay has stopped.
    pub fn unregister(&self, id: SubscriberId) {
        let _ = self.commands.send(RelayCommand::Unregister(id));
    }

    /// Latest published subscriber count.
    pub fn client_count(&self) -> usize {
        *self.clients.borrow()
    }

    /// Subscribe to subscriber-count changes.
    pub fn watch_clients(&self) -> watch::Receiver<usize> {
        self.clients.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Relay
// ─────────────────────────────────────────────────────────────────────────────

/// Consumer half of the relay.  Built with [`Relay::new`], driven by
/// [`Relay::run`].
pub struct Relay {
    config: RelayConfig,
    bridge: HandoffBridge,
    commands: mpsc::UnboundedReceiver<RelayCommand>,
    flushes: mpsc::UnboundedReceiver<FlushSignal>,
    state: RelayState,
}

// Everything the loop mutates; split out so handlers borrow it alone.
struct RelayState {
    store: BufferStore,
    scheduler: DebounceScheduler,
    registry: SubscriberRegistry,
}

impl Relay {
    /// Build a relay that will attach to `bridge` when it starts running.
    pub fn new(config: RelayConfig, bridge: HandoffBridge) -> (Self, RelayHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (scheduler, flushes) = DebounceScheduler::new(config.debounce);
        let registry = SubscriberRegistry::new();
        let handle = RelayHandle {
            commands: commands_tx,
            clients: registry.watch_count(),
        };
        let relay = Self {
            config,
            bridge,
            commands,
            flushes,
            state: RelayState {
                store: BufferStore::new(),
                scheduler,
                registry,
            },
        };
        (relay, handle)
    }

    /// Run until `shutdown` turns `true` or its sender is dropped.
    ///
    /// Unflushed buffers are discarded on exit.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the configuration fails
    /// [`RelayConfig::validate`], and [`RelayError::Channel`] if the bridge
    /// was already attached to another consumer.  Neither case attaches the
    /// bridge.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), RelayError> {
        self.config.validate()?;
        let Relay {
            config,
            bridge,
            mut commands,
            mut flushes,
            mut state,
        } = self;

        let (inbox_tx, mut inbox) = mpsc::unbounded_channel();
        bridge.attach(inbox_tx)?;
        info!(
            debounce_ms = config.debounce.as_millis() as u64,
            keepalive_s = config.keepalive.as_secs(),
            "relay consumer started"
        );

        let mut keepalive = time::interval(config.keepalive);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        keepalive.tick().await;

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    Some(event) = inbox.recv() => state.ingest(event).await,
                    Some(signal) = flushes.recv() => state.flush(signal).await,
                    Some(command) = commands.recv() => state.command(command).await,
                    _ = keepalive.tick() => state.keep_alive().await,
                }
            }
        }

        let discarded = state.store.clear();
        info!(discarded, clients = state.registry.len(), "relay consumer stopped");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event handlers
// ─────────────────────────────────────────────────────────────────────────────

impl RelayState {
    async fn ingest(&mut self, event: NodeEvent) {
        match event {
            NodeEvent::Update { node, fields } => {
                let entry = self.store.merge_update(node, fields);
                self.scheduler.reschedule_flush(entry);
                trace!(node = %node, generation = ?entry.pending_generation(), "update merged");
            }
            NodeEvent::Sensor { node, from, reading } => {
                let frame = OutboundFrame::SensorData(SensorFrame::new(node, from, reading));
                let report = fanout::broadcast(&mut self.registry, &frame).await;
                debug!(
                    node = %node,
                    delivered = report.delivered,
                    pruned = report.pruned,
                    "sensor reading relayed"
                );
            }
        }
    }

    async fn flush(&mut self, signal: FlushSignal) {
        let armed = self
            .store
            .get(signal.node)
            .and_then(NodeBufferEntry::pending_generation);
        if armed != Some(signal.generation) {
            trace!(node = %signal.node, generation = signal.generation, "stale flush ignored");
            return;
        }
        let Some(fields) = self.store.take_and_clear(signal.node) else {
            return;
        };

        let frame = OutboundFrame::MergedEvent(MergedEvent::new(signal.node, fields));
        let report = fanout::broadcast(&mut self.registry, &frame).await;
        info!(
            node = %signal.node,
            delivered = report.delivered,
            pruned = report.pruned,
            "merged event broadcast"
        );
    }

    async fn command(&mut self, command: RelayCommand) {
        match command {
            RelayCommand::Register { id, sink } => {
                self.registry.register(id, sink);
                self.registry.send_to(id, &OutboundFrame::Ping).await;
            }
            RelayCommand::Unregister(id) => {
                self.registry.unregister(id);
            }
        }
    }

    async fn keep_alive(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        let report = self.registry.keep_alive().await;
        trace!(delivered = report.delivered, pruned = report.pruned, "keep-alive sent");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
