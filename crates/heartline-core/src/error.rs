//! Error types for decoding heartbeat traffic.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("publication payload is not valid heartbeat JSON: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("bpm must be a positive finite number, got {0}")]
    InvalidBpm(f64),
}
