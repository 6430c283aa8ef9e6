//! The heartbeat sample and its two serialized shapes.
//!
//! On the distribution channel a sample travels as `{"bpm": n, "at": ms}`;
//! the ingestion gateway's REST record is `{"id", "bpm", "timestamp"}`.
//! Both convert into the same immutable [`Heartbeat`].

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// A timestamped bpm sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub bpm: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl Heartbeat {
    /// Build a heartbeat, rejecting bpm values that cannot drive a schedule.
    pub fn new(bpm: f64, timestamp: i64) -> Result<Self, DecodeError> {
        if !is_valid_bpm(bpm) {
            return Err(DecodeError::InvalidBpm(bpm));
        }
        Ok(Self { bpm, timestamp })
    }

    /// Whether `self` should replace `current` as the latest known sample.
    /// Equal timestamps supersede; older ones do not.
    #[must_use]
    pub fn supersedes(&self, current: &Heartbeat) -> bool {
        self.timestamp >= current.timestamp
    }

    /// Wire payload carried inside a `pub:` frame.
    #[must_use]
    pub fn to_payload(&self) -> String {
        let payload = HeartbeatPayload {
            bpm: self.bpm,
            at: self.timestamp,
        };
        // A struct of two numbers always serializes.
        serde_json::to_string(&payload).unwrap_or_default()
    }
}

impl From<HeartbeatRecord> for Heartbeat {
    fn from(record: HeartbeatRecord) -> Self {
        Self {
            bpm: record.bpm,
            timestamp: record.timestamp,
        }
    }
}

/// `{"bpm": n, "at": ms}` as published on the distribution channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub bpm: f64,
    pub at: i64,
}

/// A persisted sample as served by the ingestion gateway.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub id: i64,
    pub bpm: f64,
    pub timestamp: i64,
}

/// bpm must be strictly positive and finite; zero or NaN would make the
/// beat interval infinite or undefined.
#[must_use]
pub fn is_valid_bpm(bpm: f64) -> bool {
    bpm.is_finite() && bpm > 0.0
}

/// Parse the JSON payload of a matching publication.
pub fn parse_heartbeat_payload(payload: &str) -> Result<Heartbeat, DecodeError> {
    let parsed: HeartbeatPayload = serde_json::from_str(payload)?;
    Heartbeat::new(parsed.bpm, parsed.at)
}

/// Render a bpm for display: whole numbers without a fractional part.
#[must_use]
pub fn format_bpm(bpm: f64) -> String {
    if bpm.fract() == 0.0 {
        format!("{bpm:.0}")
    } else {
        format!("{bpm:.1}")
    }
}
