//! [`Producer`] – the mesh ingest thread.
//!
//! Runs outside the async runtime on a dedicated OS thread: it blocks on the
//! [`MeshInterface`], interprets every packet, and submits the resulting
//! events through the [`HandoffBridge`].  It never touches relay state.
//!
//! The shared `running` flag is checked between packets; a blocking read
//! only returns once the next line (or end of stream) arrives.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use meshrelay_types::RelayError;
use tracing::{debug, error, info};

use crate::handoff::HandoffBridge;
use crate::interface::MeshInterface;
use crate::interpreter::interpret;

/// Counters reported when the producer stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProducerStats {
    /// Packets read from the interface.
    pub received: u64,
    /// Events accepted by the bridge.
    pub submitted: u64,
    /// Packets that carried no telemetry.
    pub ignored: u64,
    /// Events the bridge refused because no consumer was running.
    pub dropped: u64,
}

pub struct Producer<I> {
    interface: I,
    bridge: HandoffBridge,
    running: Arc<AtomicBool>,
}

impl<I: MeshInterface + 'static> Producer<I> {
    pub fn new(interface: I, bridge: HandoffBridge, running: Arc<AtomicBool>) -> Self {
        Self {
            interface,
            bridge,
            running,
        }
    }

    /// Drain the interface until end of stream, an interface error, or
    /// `running` is cleared.
    pub fn run(mut self) -> ProducerStats {
        let mut stats = ProducerStats::default();

        while self.running.load(Ordering::Relaxed) {
            match self.interface.recv() {
                Ok(Some(packet)) => {
                    stats.received += 1;
                    match interpret(&packet, self.interface.nodes()) {
                        Some(event) => match self.bridge.submit(event) {
                            Ok(()) => stats.submitted += 1,
                            Err(e) => {
                                stats.dropped += 1;
                                debug!(error = %e, "handoff dropped event");
                            }
                        },
                        None => stats.ignored += 1,
                    }
                }
                Ok(None) => {
                    info!("mesh interface reached end of stream");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "mesh interface failed; ingestion stopped");
                    break;
                }
            }
        }

        info!(
            received = stats.received,
            submitted = stats.submitted,
            ignored = stats.ignored,
            dropped = stats.dropped,
            "mesh producer stopped"
        );
        stats
    }

    /// Run the producer on a named OS thread.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Interface`] if the thread cannot be spawned.
    pub fn spawn(self) -> Result<JoinHandle<ProducerStats>, RelayError> {
        thread::Builder::new()
            .name("mesh-producer".to_string())
            .spawn(move || self.run())
            .map_err(|e| RelayError::Interface(format!("failed to spawn producer thread: {e}")))
    }
}
