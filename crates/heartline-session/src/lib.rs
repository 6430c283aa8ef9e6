//! Async drivers around the pure heartline core.
//!
//! - [`socket::Session`] owns the connection to the distribution gateway.
//! - [`liveness::spawn_liveness`] refreshes the dead/alive view every second.
//! - [`pulse::PulseDriver`] turns the latest bpm into pulses on a [`pulse::PulseSink`].
//!
//! Each driver is one tokio task. State flows between them through `watch`
//! channels with a single writer; teardown is a `CancellationToken`.

pub mod error;
pub mod liveness;
pub mod pulse;
pub mod seed;
pub mod socket;

pub use error::{SessionError, SinkError};
pub use liveness::{Clock, SystemClock, spawn_liveness};
pub use pulse::{BellSink, PulseDriver, PulseHandle, PulseSink};
pub use socket::{Session, SessionConfig};
