//! One-shot fetch of the latest persisted heartbeat, used to seed a session
//! before its live connection is up.

use std::time::Duration;

use heartline_core::{Heartbeat, HeartbeatRecord};

use crate::error::SessionError;

const SEED_TIMEOUT: Duration = Duration::from_secs(10);

/// GET the ingestion gateway's latest record.
pub async fn fetch_latest(api_url: &str) -> Result<Heartbeat, SessionError> {
    let client = reqwest::Client::builder().timeout(SEED_TIMEOUT).build()?;
    let resp = client.get(api_url).send().await?;
    if !resp.status().is_success() {
        return Err(SessionError::Status(resp.status()));
    }
    let record: HeartbeatRecord = resp.json().await?;
    tracing::debug!(id = record.id, bpm = record.bpm, timestamp = record.timestamp, "fetched seed heartbeat");
    Ok(Heartbeat::new(record.bpm, record.timestamp)?)
}
