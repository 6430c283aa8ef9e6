//! Liveness evaluation and relative-time formatting.
//!
//! Both are pure functions of `(timestamp, now)`; the caller owns the clock
//! and is expected to refresh `now` at least once per second.

use serde::{Deserialize, Serialize};

use crate::heartbeat::Heartbeat;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// A heartbeat older than this is considered dead.
pub const DEAD_THRESHOLD_MS: i64 = 12 * HOUR_MS;

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

/// `true` when the heartbeat is strictly older than [`DEAD_THRESHOLD_MS`].
/// A heartbeat exactly at the threshold is still alive.
#[must_use]
pub fn is_dead(heartbeat: &Heartbeat, now_ms: i64) -> bool {
    now_ms.saturating_sub(heartbeat.timestamp) > DEAD_THRESHOLD_MS
}

/// Derived view of a heartbeat at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessSnapshot {
    pub now_ms: i64,
    pub dead: bool,
    /// Relative age, e.g. `"45s"`.
    pub ago: String,
}

impl LivenessSnapshot {
    #[must_use]
    pub fn evaluate(heartbeat: &Heartbeat, now_ms: i64) -> Self {
        Self {
            now_ms,
            dead: is_dead(heartbeat, now_ms),
            ago: relative_time(heartbeat.timestamp, now_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Relative time
// ---------------------------------------------------------------------------

/// Format the age of `timestamp_ms` relative to `now_ms` in the coarsest unit
/// that fits, truncating toward zero.
///
/// | delta      | unit                       |
/// |------------|----------------------------|
/// | < 1 min    | `s`                        |
/// | < 1 hour   | `m`                        |
/// | < 1 day    | `h`                        |
/// | < 7 days   | `d`                        |
/// | < 30 days  | `w`                        |
/// | < 365 days | `m` (months of 30 days)    |
/// | otherwise  | `y` (years of 365 days)    |
///
/// Timestamps in the future (clock skew) render as `"0s"`.
#[must_use]
pub fn relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms).max(0);

    if diff < MINUTE_MS {
        format!("{}s", diff / SECOND_MS)
    } else if diff < HOUR_MS {
        format!("{}m", diff / MINUTE_MS)
    } else if diff < DAY_MS {
        format!("{}h", diff / HOUR_MS)
    } else if diff < 7 * DAY_MS {
        format!("{}d", diff / DAY_MS)
    } else if diff < 30 * DAY_MS {
        format!("{}w", diff / (7 * DAY_MS))
    } else if diff < 365 * DAY_MS {
        format!("{}m", diff / (30 * DAY_MS))
    } else {
        format!("{}y", diff / (365 * DAY_MS))
    }
}
