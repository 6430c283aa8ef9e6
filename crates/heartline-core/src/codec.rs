//! Line-oriented pub/sub frame codec.
//!
//! Frames are colon-delimited text. Only the first one or two colons are
//! structural; a publication payload is JSON and may contain colons of its
//! own, so it is taken verbatim from after the channel token.
//!
//! ```text
//! gateway -> subscriber   ack
//!                         pub:<channels>:<payload>
//! subscriber -> gateway   sub:<channel>
//!                         nack
//! ```

use std::fmt;

const ACK: &str = "ack";
const NACK: &str = "nack";
const PUB: &str = "pub";
const SUB: &str = "sub";

// ---------------------------------------------------------------------------
// Gateway -> subscriber
// ---------------------------------------------------------------------------

/// A decoded frame received by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    /// Gateway liveness probe. Must be answered with [`ClientFrame::Nack`].
    Ack,
    /// Broadcast on one or more channels. The payload stays opaque until a
    /// channel match succeeds.
    Publication { channels: String, payload: String },
    /// Any other frame. Diagnostics only.
    Other { action: String, raw: String },
}

/// Decode one inbound text frame. Never fails: unknown shapes become
/// [`ChannelMessage::Other`].
#[must_use]
pub fn decode(raw: &str) -> ChannelMessage {
    if raw == ACK {
        return ChannelMessage::Ack;
    }

    let (action, rest) = raw.split_once(':').unwrap_or((raw, ""));
    if action != PUB {
        return ChannelMessage::Other {
            action: action.to_string(),
            raw: raw.to_string(),
        };
    }

    let (channels, payload) = rest.split_once(':').unwrap_or((rest, ""));
    ChannelMessage::Publication {
        channels: channels.to_string(),
        payload: payload.to_string(),
    }
}

/// Membership test on a comma-separated channel token. Entries are compared
/// exactly after trimming, so `nobu_health_old` does not match `nobu_health`.
#[must_use]
pub fn channel_list_contains(channels: &str, channel: &str) -> bool {
    channels.split(',').any(|c| c.trim() == channel)
}

/// Gateway liveness probe frame.
#[must_use]
pub fn encode_ack() -> &'static str {
    ACK
}

/// Build a `pub:` frame. Channel names must not contain `:` or `,`.
#[must_use]
pub fn encode_publication<S: AsRef<str>>(channels: &[S], payload: &str) -> String {
    let list: Vec<&str> = channels.iter().map(AsRef::as_ref).collect();
    format!("{PUB}:{}:{payload}", list.join(","))
}

// ---------------------------------------------------------------------------
// Subscriber -> gateway
// ---------------------------------------------------------------------------

/// A frame sent by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Subscribe(String),
    Nack,
    Unknown(String),
}

impl ClientFrame {
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ClientFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribe(channel) => write!(f, "{SUB}:{channel}"),
            Self::Nack => f.write_str(NACK),
            Self::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// Decode a frame sent by a subscriber (relay side).
#[must_use]
pub fn decode_client(raw: &str) -> ClientFrame {
    if raw == NACK {
        return ClientFrame::Nack;
    }
    match raw.split_once(':') {
        Some((SUB, channel)) if !channel.is_empty() => ClientFrame::Subscribe(channel.to_string()),
        _ => ClientFrame::Unknown(raw.to_string()),
    }
}
