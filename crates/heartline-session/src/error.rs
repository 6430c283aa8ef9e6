//! Error types for the session drivers.

use heartline_core::DecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("seed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("seed request returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid seed heartbeat: {0}")]
    Decode(#[from] DecodeError),
}

/// A single pulse could not be played. Never fatal to the schedule.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("pulse output failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("pulse rejected: {0}")]
    Rejected(String),
}
