//! Subscription session: one task owning one gateway connection.
//!
//! The task feeds connection events into a [`SessionMachine`] in arrival
//! order and performs whatever the machine returns. Observers see the latest
//! heartbeat and the connection status through `watch` receivers; nothing
//! else about the connection is shared.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use heartline_core::Heartbeat;
use heartline_core::session::{ConnectionStatus, FrameOutcome, IgnoreReason, SessionMachine};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// How long a caller-initiated close waits for the close frame to go out.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket URL of the distribution gateway, e.g. `wss://gateway.example`.
    pub url: String,
    /// The one channel this session cares about.
    pub channel: String,
}

/// Handle to a running subscription session.
///
/// Dropping the handle tears the session down, same as [`Session::close`]
/// without waiting for the task to finish.
pub struct Session {
    heartbeat_rx: watch::Receiver<Heartbeat>,
    status_rx: watch::Receiver<ConnectionStatus>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Session {
    /// Spawn the session task and start connecting. `seed` is the heartbeat
    /// observers see until the first publication arrives.
    pub fn connect(config: SessionConfig, seed: Heartbeat) -> Self {
        let machine = SessionMachine::new(config.channel.clone(), seed);
        let (heartbeat_tx, heartbeat_rx) = watch::channel(seed);
        let (status_tx, status_rx) = watch::channel(machine.status());
        let cancel = CancellationToken::new();

        let task = SessionTask {
            url: config.url,
            machine,
            heartbeat_tx,
            status_tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run());

        Self {
            heartbeat_rx,
            status_rx,
            cancel,
            handle: Some(handle),
        }
    }

    /// Read-only view of the latest heartbeat.
    pub fn heartbeat(&self) -> watch::Receiver<Heartbeat> {
        self.heartbeat_rx.clone()
    }

    /// Read-only view of the connection lifecycle.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    pub fn latest(&self) -> Heartbeat {
        *self.heartbeat_rx.borrow()
    }

    /// Stop dispatch, release the connection and wait for the task to exit.
    /// The final status is `Closed` unless the connection had already failed.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "session task panicked");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

struct SessionTask {
    url: String,
    machine: SessionMachine,
    heartbeat_tx: watch::Sender<Heartbeat>,
    status_tx: watch::Sender<ConnectionStatus>,
    cancel: CancellationToken,
}

impl SessionTask {
    async fn run(mut self) {
        tracing::debug!(url = %self.url, channel = %self.machine.channel(), "session connecting");

        let ws = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!("session closed before connecting");
                self.machine.on_close();
                self.publish_status();
                return;
            }
            result = tokio_tungstenite::connect_async(self.url.as_str()) => match result {
                Ok((ws, _)) => ws,
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "session failed to connect");
                    self.machine.on_error();
                    self.publish_status();
                    return;
                }
            },
        };

        let (mut ws_tx, mut ws_rx) = ws.split();

        if let Some(frame) = self.machine.on_open() {
            self.publish_status();
            tracing::debug!(channel = %self.machine.channel(), "session connected, subscribing");
            if let Err(e) = ws_tx.send(Message::Text(frame.encode())).await {
                tracing::warn!(error = %e, "failed to send subscribe frame");
                self.machine.on_error();
                self.publish_status();
                return;
            }
        }

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("session close requested");
                    let _ = tokio::time::timeout(CLOSE_GRACE, ws_tx.send(Message::Close(None))).await;
                    self.machine.on_close();
                    break;
                }
                msg = ws_rx.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                                tracing::warn!(error = %e, "failed to answer ping");
                                self.machine.on_error();
                                break;
                            }
                            continue;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::debug!("session disconnected");
                            self.machine.on_close();
                            break;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "session read error");
                            self.machine.on_error();
                            break;
                        }
                    };

                    match self.machine.on_frame(&text) {
                        FrameOutcome::Reply(frame) => {
                            if let Err(e) = ws_tx.send(Message::Text(frame.encode())).await {
                                tracing::warn!(error = %e, "failed to answer liveness probe");
                                self.machine.on_error();
                                break;
                            }
                        }
                        FrameOutcome::Updated(hb) => {
                            tracing::debug!(bpm = hb.bpm, at = hb.timestamp, "health update");
                            self.heartbeat_tx.send_replace(hb);
                        }
                        FrameOutcome::Ignored(reason) => log_ignored(&reason, &text),
                    }
                }
            }
        }

        self.publish_status();
    }

    fn publish_status(&self) {
        let status = self.machine.status();
        tracing::debug!(status = status.as_str(), "session status");
        self.status_tx.send_replace(status);
    }
}

fn log_ignored(reason: &IgnoreReason, raw: &str) {
    match reason {
        IgnoreReason::BadPayload(detail) => {
            tracing::warn!(frame = %raw, error = %detail, "dropping malformed publication");
        }
        IgnoreReason::Stale { received, latest } => {
            tracing::debug!(received, latest, "dropping out-of-order publication");
        }
        IgnoreReason::OtherChannel(channels) => {
            tracing::debug!(channels = %channels, "publication for another channel");
        }
        IgnoreReason::Unhandled { action } => {
            tracing::debug!(action = %action, frame = %raw, "unhandled frame");
        }
        IgnoreReason::NotOpen => {}
    }
}
