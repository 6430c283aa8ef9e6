//! Pure, side-effect-free building blocks for heartline.
//!
//! Nothing in this crate touches a socket, a timer, or the wall clock on its
//! own: every function takes the current time as an argument so the async
//! drivers in `heartline-session` and the tests can control it.

pub mod codec;
pub mod error;
pub mod heartbeat;
pub mod liveness;
pub mod schedule;
pub mod session;

pub use error::DecodeError;
pub use heartbeat::{Heartbeat, HeartbeatRecord};

/// Channel the heartbeat source publishes on unless configured otherwise.
pub const DEFAULT_CHANNEL: &str = "nobu_health";
