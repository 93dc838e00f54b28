//! [`RelayServer`] – WebSocket push channel and HTTP status endpoint.
//!
//! Listens on `0.0.0.0:8000` (configurable via [`RelayServer::with_port`]).
//!
//! * WebSocket upgrades (any path) → a subscriber registered with the relay.
//! * Every other request → `200 OK` with the status JSON.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use meshrelay_runtime::{ChannelSink, RelayHandle};
use meshrelay_types::RelayError;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// Status body
// ---------------------------------------------------------------------------

/// Default TCP port for the push channel and status endpoint.
pub const DEFAULT_PORT: u16 = 8000;

/// Body of the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
    /// Always `"running"` while the server answers.
    pub status: &'static str,
    /// Subscribers currently registered with the relay.
    pub clients: usize,
}

impl Status {
    /// Status body for a live relay with `clients` subscribers.
    pub fn running(clients: usize) -> Self {
        Self {
            status: "running",
            clients,
        }
    }
}

// ---------------------------------------------------------------------------
// RelayServer
// ---------------------------------------------------------------------------

/// Front door of the relay: hands every push-channel connection to the
/// relay consumer as a subscriber.
///
/// # Example
///
/// ```rust,no_run
/// use meshrelay_middleware::HandoffBridge;
/// use meshrelay_runtime::{Relay, RelayConfig};
/// use meshrelay_server::RelayServer;
/// use tokio::sync::watch;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let (relay, handle) = Relay::new(RelayConfig::default(), HandoffBridge::detached());
///     let (_stop, shutdown) = watch::channel(false);
///     tokio::spawn(relay.run(shutdown.clone()));
///     RelayServer::new(handle).run(shutdown).await.expect("relay server failed");
/// }
/// ```
pub struct RelayServer {
    relay: RelayHandle,
    port: u16,
}

impl RelayServer {
    /// Create a server on the [`DEFAULT_PORT`].
    pub fn new(relay: RelayHandle) -> Self {
        Self {
            relay,
            port: DEFAULT_PORT,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Port [`RelayServer::run`] will bind.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind the configured port and serve until `shutdown` turns `true`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] if the TCP listener cannot bind.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), RelayError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Bind(format!("cannot listen on {addr}: {e}")))?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already-bound `listener`.
    ///
    /// Connections accepted before shutdown keep running until the relay
    /// drops their subscriber or the peer disconnects.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), RelayError> {
        if let Ok(local) = listener.local_addr() {
            info!(addr = %local, "push channel listening");
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let relay = self.relay.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, relay).await {
                                warn!(peer = %peer, error = %e, "connection failed");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                },
            }
        }

        info!("push channel stopped accepting connections");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-connection handlers
// ---------------------------------------------------------------------------

/// Route one accepted socket by peeking at its request head.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    relay: RelayHandle,
) -> Result<(), RelayError> {
    // `peek` leaves the request in place for the WebSocket handshake.
    let mut head = [0u8; 1024];
    let n = stream
        .peek(&mut head)
        .await
        .map_err(|e| RelayError::SubscriberClosed(format!("peek from {peer}: {e}")))?;
    if n == 0 {
        return Ok(());
    }

    if is_websocket_upgrade(&head[..n]) {
        handle_push_channel(stream, peer, relay).await
    } else {
        serve_status(stream, peer, &relay).await
    }
}

/// `true` when the request head carries `Upgrade: websocket`.
pub(crate) fn is_websocket_upgrade(head: &[u8]) -> bool {
    String::from_utf8_lossy(head).lines().any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.trim().eq_ignore_ascii_case("upgrade")
                && value.trim().to_ascii_lowercase().contains("websocket")
        })
    })
}

/// Answer a plain HTTP request with the [`Status`] JSON and close.
async fn serve_status(
    mut stream: TcpStream,
    peer: SocketAddr,
    relay: &RelayHandle,
) -> Result<(), RelayError> {
    // Consume the request head so closing the socket does not reset it.
    let mut request = [0u8; 1024];
    let _ = stream.read(&mut request).await;

    let body = serde_json::to_string(&Status::running(relay.client_count()))
        .map_err(|e| RelayError::Serialization(e.to_string()))?;
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, OPTIONS\r\n\
         Access-Control-Allow-Headers: *\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        body.len(),
        body
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| RelayError::SubscriberClosed(format!("status write to {peer}: {e}")))?;
    let _ = stream.shutdown().await;
    debug!(peer = %peer, "status served");
    Ok(())
}

/// Drive one WebSocket subscriber until either side goes away.
///
/// Frames from the relay are written as text messages; inbound messages
/// only matter for detecting a close.
async fn handle_push_channel(
    stream: TcpStream,
    peer: SocketAddr,
    relay: RelayHandle,
) -> Result<(), RelayError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| RelayError::SubscriberClosed(format!("handshake from {peer}: {e}")))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (sink, mut frames) = ChannelSink::pair();
    let id = relay.register(sink)?;
    info!(peer = %peer, subscriber = %id, "push channel opened");

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(text) => {
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        debug!(peer = %peer, error = %e, "push channel write failed");
                        break;
                    }
                }
                // The relay dropped this subscriber.
                None => break,
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(peer = %peer, error = %e, "push channel read failed");
                    break;
                }
                // Inbound payloads are read and discarded.
                Some(Ok(_)) => {}
            },
        }
    }

    relay.unregister(id);
    let _ = ws_tx.close().await;
    info!(peer = %peer, subscriber = %id, "push channel closed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
