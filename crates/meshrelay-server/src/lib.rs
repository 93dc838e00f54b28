//! `meshrelay-server` – the relay's network face.
//!
//! One TCP port (default `8000`) carries both:
//!
//! 1. **The push channel.**  Any request with `Upgrade: websocket` becomes a
//!    subscriber of the relay consumer.  It receives a `{"type":"ping"}` right
//!    away and every ten seconds after, plus a `merged_event` frame per
//!    debounce flush and a `sensor_data` frame per firmware reading.
//!    Anything the client sends is read and discarded.
//!
//! 2. **The status endpoint.**  Every other request is answered with
//!    `{"status":"running","clients":<n>}` and permissive CORS headers.
//!
//! # Usage
//!
//! ```rust,no_run
//! use meshrelay_middleware::HandoffBridge;
//! use meshrelay_runtime::{Relay, RelayConfig};
//! use meshrelay_server::RelayServer;
//! use tokio::sync::watch;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let bridge = HandoffBridge::detached();
//!     let (relay, handle) = Relay::new(RelayConfig::default(), bridge.clone());
//!     let (_stop, shutdown) = watch::channel(false);
//!     tokio::spawn(relay.run(shutdown.clone()));
//!     RelayServer::new(handle)
//!         .with_port(8000)
//!         .run(shutdown)
//!         .await
//!         .expect("relay server failed");
//! }
//! ```

pub mod server;

pub use server::{DEFAULT_PORT, RelayServer, Status};
