//! `meshrelay-runtime` – the relay consumer.
//!
//! Everything here runs on the async runtime's consumer task.  Node events
//! cross in from the producer thread through a
//! [`HandoffBridge`][meshrelay_middleware::HandoffBridge]; merged events and
//! sensor readings leave through [`SubscriberSink`]s.
//!
//! # Modules
//!
//! - [`buffer`] – [`BufferStore`]: per-node accumulators awaiting a flush.
//! - [`debounce`] – [`DebounceScheduler`]: cancel-and-reschedule flush timers
//!   with generation-tagged signals.
//! - [`registry`] – [`SubscriberRegistry`] and the [`SubscriberSink`] seam.
//! - [`fanout`] – [`broadcast`]: best-effort delivery with pruning.
//! - [`relay`] – [`Relay`]: the `select!` loop tying the above together.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing].

pub mod buffer;
pub mod debounce;
pub mod fanout;
pub mod registry;
pub mod relay;
pub mod telemetry;

pub use buffer::{BufferStore, NodeBufferEntry};
pub use debounce::{DebounceScheduler, FlushHandle, FlushSignal};
pub use fanout::{FanoutReport, broadcast};
pub use registry::{ChannelSink, SubscriberId, SubscriberRegistry, SubscriberSink};
pub use relay::{DEFAULT_DEBOUNCE, DEFAULT_KEEPALIVE, Relay, RelayCommand, RelayConfig, RelayHandle};
