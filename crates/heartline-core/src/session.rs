//! Subscription session state machine.
//!
//! Pure and synchronous: each connection event has exactly one entry point,
//! which mutates the machine and returns what the driver must do next. The
//! socket-owning task in `heartline-session` feeds events in arrival order.

use serde::{Deserialize, Serialize};

use crate::codec::{self, ChannelMessage, ClientFrame};
use crate::heartbeat::{Heartbeat, parse_heartbeat_payload};

/// Lifecycle of one connection instance. `Closed` and `Errored` are terminal.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Open,
    Closed,
    Errored,
}

impl ConnectionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Errored => "errored",
        }
    }
}

/// What happened as a result of one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Send this frame back to the gateway.
    Reply(ClientFrame),
    /// `latest` changed.
    Updated(Heartbeat),
    /// Nothing to do; the reason is kept for diagnostics.
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IgnoreReason {
    NotOpen,
    OtherChannel(String),
    Stale { received: i64, latest: i64 },
    BadPayload(String),
    Unhandled { action: String },
}

/// Owns the authoritative session state for one connection.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    channel: String,
    status: ConnectionStatus,
    latest: Heartbeat,
}

impl SessionMachine {
    /// Start in `Connecting` with a caller-supplied seed so consumers never
    /// observe an undefined heartbeat.
    pub fn new(channel: impl Into<String>, seed: Heartbeat) -> Self {
        Self {
            channel: channel.into(),
            status: ConnectionStatus::Connecting,
            latest: seed,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn latest(&self) -> Heartbeat {
        self.latest
    }

    /// Connection established. Returns the subscribe frame to send, or
    /// `None` when the machine already reached a terminal state.
    pub fn on_open(&mut self) -> Option<ClientFrame> {
        if self.status != ConnectionStatus::Connecting {
            return None;
        }
        self.status = ConnectionStatus::Open;
        Some(ClientFrame::Subscribe(self.channel.clone()))
    }

    /// Handle one inbound text frame.
    pub fn on_frame(&mut self, raw: &str) -> FrameOutcome {
        if self.status != ConnectionStatus::Open {
            return FrameOutcome::Ignored(IgnoreReason::NotOpen);
        }

        match codec::decode(raw) {
            ChannelMessage::Ack => FrameOutcome::Reply(ClientFrame::Nack),
            ChannelMessage::Publication { channels, payload } => {
                if !codec::channel_list_contains(&channels, &self.channel) {
                    return FrameOutcome::Ignored(IgnoreReason::OtherChannel(channels));
                }
                match parse_heartbeat_payload(&payload) {
                    Ok(hb) => self.apply(hb),
                    Err(e) => FrameOutcome::Ignored(IgnoreReason::BadPayload(e.to_string())),
                }
            }
            ChannelMessage::Other { action, .. } => {
                FrameOutcome::Ignored(IgnoreReason::Unhandled { action })
            }
        }
    }

    /// Connection closed, by either side. Returns `true` on the transition.
    pub fn on_close(&mut self) -> bool {
        self.finish(ConnectionStatus::Closed)
    }

    /// Transport failure. Returns `true` on the transition.
    pub fn on_error(&mut self) -> bool {
        self.finish(ConnectionStatus::Errored)
    }

    fn finish(&mut self, terminal: ConnectionStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = terminal;
        true
    }

    fn apply(&mut self, hb: Heartbeat) -> FrameOutcome {
        if !hb.supersedes(&self.latest) {
            return FrameOutcome::Ignored(IgnoreReason::Stale {
                received: hb.timestamp,
                latest: self.latest.timestamp,
            });
        }
        self.latest = hb;
        FrameOutcome::Updated(hb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: &str = r#"pub:nobu_health:{"bpm":72,"at":1700000000000}"#;

    fn seed() -> Heartbeat {
        Heartbeat { bpm: 60.0, timestamp: 1_000 }
    }

    fn open(channel: &str) -> SessionMachine {
        let mut m = SessionMachine::new(channel, seed());
        assert_eq!(m.on_open(), Some(ClientFrame::Subscribe(channel.into())));
        m
    }

    #[test]
    fn starts_connecting_with_seed() {
        let m = SessionMachine::new("nobu_health", seed());
        assert_eq!(m.status(), ConnectionStatus::Connecting);
        assert_eq!(m.latest(), seed());
    }

    #[test]
    fn open_sends_subscribe_once() {
        let mut m = open("nobu_health");
        assert_eq!(m.status(), ConnectionStatus::Open);
        assert_eq!(m.on_open(), None);
    }

    #[test]
    fn matching_publication_updates_latest() {
        let mut m = open("nobu_health");
        let expected = Heartbeat { bpm: 72.0, timestamp: 1_700_000_000_000 };
        assert_eq!(m.on_frame(FRAME), FrameOutcome::Updated(expected));
        assert_eq!(m.latest(), expected);
    }

    #[test]
    fn other_channel_leaves_state() {
        let mut m = open("other_channel");
        assert!(matches!(
            m.on_frame(FRAME),
            FrameOutcome::Ignored(IgnoreReason::OtherChannel(_))
        ));
        assert_eq!(m.latest(), seed());
    }

    #[test]
    fn ack_yields_exactly_one_nack() {
        let mut m = open("nobu_health");
        assert_eq!(m.on_frame("ack"), FrameOutcome::Reply(ClientFrame::Nack));
        assert_eq!(m.latest(), seed());
        assert_eq!(m.status(), ConnectionStatus::Open);
    }

    #[test]
    fn malformed_payload_is_dropped() {
        let mut m = open("nobu_health");
        let outcome = m.on_frame("pub:nobu_health:{\"bpm\":72,");
        assert!(matches!(outcome, FrameOutcome::Ignored(IgnoreReason::BadPayload(_))));
        assert_eq!(m.latest(), seed());
    }

    #[test]
    fn older_publication_is_ignored() {
        let mut m = open("nobu_health");
        m.on_frame(FRAME);
        let outcome = m.on_frame(r#"pub:nobu_health:{"bpm":90,"at":5}"#);
        assert_eq!(
            outcome,
            FrameOutcome::Ignored(IgnoreReason::Stale {
                received: 5,
                latest: 1_700_000_000_000,
            })
        );
        assert!((m.latest().bpm - 72.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_action_is_diagnostic_only() {
        let mut m = open("nobu_health");
        assert_eq!(
            m.on_frame("info:hello:world"),
            FrameOutcome::Ignored(IgnoreReason::Unhandled { action: "info".into() })
        );
        assert_eq!(m.latest(), seed());
    }

    #[test]
    fn frames_before_open_are_ignored() {
        let mut m = SessionMachine::new("nobu_health", seed());
        assert_eq!(m.on_frame(FRAME), FrameOutcome::Ignored(IgnoreReason::NotOpen));
        assert_eq!(m.latest(), seed());
    }

    #[test]
    fn close_mid_handshake_is_terminal() {
        let mut m = SessionMachine::new("nobu_health", seed());
        assert!(m.on_close());
        assert_eq!(m.status(), ConnectionStatus::Closed);
        assert_eq!(m.on_open(), None);
        assert!(!m.on_error());
        assert_eq!(m.status(), ConnectionStatus::Closed);
        assert_eq!(m.on_frame(FRAME), FrameOutcome::Ignored(IgnoreReason::NotOpen));
    }

    #[test]
    fn error_after_open_is_terminal() {
        let mut m = open("nobu_health");
        assert!(m.on_error());
        assert_eq!(m.status(), ConnectionStatus::Errored);
        assert!(!m.on_close());
    }
}
