use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use heartline_core::codec::{self, ClientFrame};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Default maximum number of concurrent subscribers.
const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Default period between `ack` liveness probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Publications buffered per subscriber before a slow one starts skipping.
const PUBLICATION_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// Relay handle
// ---------------------------------------------------------------------------

/// One fan-out message: an opaque payload addressed to a set of channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub channels: Vec<String>,
    pub message: String,
}

/// Cloneable handle used to publish into the relay. At-most-once: a
/// subscriber that is not connected, or lags too far, misses the message.
#[derive(Clone)]
pub struct Relay {
    tx: broadcast::Sender<Arc<Publication>>,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(PUBLICATION_BUFFER);
        Self { tx }
    }

    /// Fan `message` out to every subscriber of any of `channels`. Returns
    /// the number of connected subscribers that will see it.
    pub fn publish(&self, channels: Vec<String>, message: String) -> usize {
        let publication = Arc::new(Publication { channels, message });
        match self.tx.send(publication) {
            Ok(n) => n,
            Err(_) => {
                tracing::debug!("relay: publication dropped, no subscribers connected");
                0
            }
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Arc<Publication>> {
        self.tx.subscribe()
    }
}

// ---------------------------------------------------------------------------
// RelayServer
// ---------------------------------------------------------------------------

/// WebSocket distribution relay speaking the `sub:`/`pub:`/`ack`/`nack`
/// text protocol.
pub struct RelayServer {
    addr: SocketAddr,
    relay: Relay,
    cancel: CancellationToken,
    max_connections: usize,
    probe_interval: Duration,
}

impl RelayServer {
    pub fn new(addr: SocketAddr, relay: Relay, cancel: CancellationToken) -> Self {
        Self {
            addr,
            relay,
            cancel,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }

    /// Set the maximum number of concurrent subscribers.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the period between liveness probes. A zero period keeps the
    /// current one.
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            tracing::warn!(
                kept_ms = self.probe_interval.as_millis() as u64,
                "relay: zero probe interval ignored"
            );
        } else {
            self.probe_interval = interval;
        }
        self
    }

    /// Bind to the configured address and return the actual local address.
    /// Useful when binding to port 0 to get an OS-assigned ephemeral port.
    pub async fn bind(&self) -> std::io::Result<(TcpListener, SocketAddr)> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            max_connections = self.max_connections,
            probe_interval_ms = self.probe_interval.as_millis() as u64,
            "relay listening"
        );
        Ok((listener, local_addr))
    }

    /// Accept subscribers on a pre-bound listener until the cancellation
    /// token fires. Connections beyond `max_connections` are closed unanswered.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let slots = Arc::new(Semaphore::new(self.max_connections));

        loop {
            let (stream, peer) = tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("relay: cancellation requested, shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!(error = %e, "relay: TCP accept failed");
                        continue;
                    }
                },
            };

            match Arc::clone(&slots).try_acquire_owned() {
                Ok(slot) => self.spawn_subscriber(stream, peer, slot),
                Err(_) => tracing::warn!(
                    peer = %peer,
                    max = self.max_connections,
                    "relay: subscriber limit reached, closing connection"
                ),
            }
        }
    }

    /// Upgrade one accepted connection and run its subscriber loop. The slot
    /// is held until the subscriber leaves.
    fn spawn_subscriber(&self, stream: TcpStream, peer: SocketAddr, slot: OwnedSemaphorePermit) {
        let subscriber = Subscriber {
            publications: self.relay.subscribe(),
            probe_interval: self.probe_interval,
            cancel: self.cancel.clone(),
        };
        tokio::spawn(async move {
            let _slot = slot;
            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::debug!(peer = %peer, error = %e, "relay handshake failed");
                    return;
                }
            };
            tracing::debug!(peer = %peer, "relay subscriber connected");
            if let Err(e) = subscriber.run(ws).await {
                tracing::debug!(peer = %peer, error = %e, "relay subscriber finished with error");
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Per-subscriber handler
// ---------------------------------------------------------------------------

/// One connected subscriber: its publication feed and probe cadence.
struct Subscriber {
    publications: broadcast::Receiver<Arc<Publication>>,
    probe_interval: Duration,
    cancel: CancellationToken,
}

impl Subscriber {
    async fn run(
        mut self,
        ws: WebSocketStream<TcpStream>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (mut ws_tx, mut ws_rx) = ws.split();

        let mut channels: HashSet<String> = HashSet::new();
        let mut awaiting_nack = false;
        let period = self.probe_interval;
        let mut probe = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // --- incoming frame ---
                msg = ws_rx.next() => {
                    let msg = match msg {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::debug!("relay subscriber disconnected (stream ended)");
                            return Ok(());
                        }
                    };

                    let text = match msg {
                        Message::Text(t) => t,
                        Message::Close(_) => {
                            tracing::debug!("relay subscriber sent close frame");
                            return Ok(());
                        }
                        Message::Ping(data) => {
                            ws_tx.send(Message::Pong(data)).await?;
                            continue;
                        }
                        _ => continue,
                    };

                    match codec::decode_client(&text) {
                        ClientFrame::Subscribe(channel) => {
                            tracing::debug!(channel = %channel, "relay subscriber joined channel");
                            channels.insert(channel);
                        }
                        ClientFrame::Nack => awaiting_nack = false,
                        ClientFrame::Unknown(raw) => {
                            tracing::debug!(frame = %raw, "relay: unknown subscriber frame");
                        }
                    }
                }

                // --- liveness probe ---
                _ = probe.tick() => {
                    if awaiting_nack {
                        tracing::info!("relay subscriber missed liveness probe, dropping");
                        let _ = ws_tx.send(Message::Close(None)).await;
                        return Ok(());
                    }
                    ws_tx.send(Message::Text(codec::encode_ack().to_string())).await?;
                    awaiting_nack = true;
                }

                // --- publication fan-out ---
                publication = self.publications.recv() => {
                    let publication = match publication {
                        Ok(p) => p,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "relay subscriber lagged, dropped publications");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::debug!("relay publication channel closed, dropping subscriber");
                            return Ok(());
                        }
                    };

                    if publication.channels.iter().any(|c| channels.contains(c)) {
                        let frame = codec::encode_publication(publication.channels.as_slice(), &publication.message);
                        ws_tx.send(Message::Text(frame)).await?;
                    }
                }

                // --- cancellation ---
                _ = self.cancel.cancelled() => {
                    tracing::debug!("relay subscriber handler: cancellation requested");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
