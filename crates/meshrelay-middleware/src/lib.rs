//! `meshrelay-middleware` – The Ingest Side
//!
//! Everything that runs on, or talks to, the mesh producer thread.  Nothing in
//! this crate touches relay state; the only way across is the
//! [`HandoffBridge`].
//!
//! # Modules
//!
//! - [`interpreter`] – maps a decoded [`MeshPacket`] into a
//!   [`NodeEvent`] or drops it.
//! - [`node_db`] – per-node metadata (display names, last device metrics)
//!   kept by the interface.
//! - [`interface`] – the [`MeshInterface`] trait and the JSON-lines
//!   implementation reading a serial device, file or stdin.
//! - [`handoff`] – the non-blocking producer → consumer submission handle.
//! - [`producer`] – the dedicated thread draining an interface into the
//!   bridge.
//!
//! [`MeshPacket`]: meshrelay_types::MeshPacket
//! [`NodeEvent`]: meshrelay_types::NodeEvent

pub mod handoff;
pub mod interface;
pub mod interpreter;
pub mod node_db;
pub mod producer;

pub use handoff::HandoffBridge;
pub use interface::{JsonLinesInterface, MeshInterface};
pub use interpreter::{interpret, parse_sensor_reading};
pub use node_db::NodeDb;
pub use producer::{Producer, ProducerStats};
