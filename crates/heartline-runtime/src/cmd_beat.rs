//! `heartline beat`: post one sample to the ingestion gateway.

use anyhow::Context;
use heartline_core::heartbeat::is_valid_bpm;

use crate::cli::BeatOpts;

/// What the gateway recorded.
#[derive(Debug, serde::Deserialize)]
pub struct Accepted {
    pub bpm: f64,
    pub timestamp: i64,
}

pub async fn cmd_beat(opts: &BeatOpts) -> anyhow::Result<Accepted> {
    if !is_valid_bpm(opts.bpm) {
        anyhow::bail!("bpm must be a positive number, got {}", opts.bpm);
    }

    let resp = reqwest::Client::new()
        .post(&opts.api_url)
        .bearer_auth(&opts.key)
        .json(&serde_json::json!({ "bpm": opts.bpm }))
        .send()
        .await
        .with_context(|| format!("failed to reach {}", opts.api_url))?;

    let status = resp.status();
    if !status.is_success() {
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        let reason = body["error"].as_str().unwrap_or("unknown error");
        anyhow::bail!("gateway rejected sample ({status}): {reason}");
    }

    let accepted: Accepted = resp.json().await.context("malformed gateway response")?;
    tracing::debug!(bpm = accepted.bpm, timestamp = accepted.timestamp, "sample accepted");
    Ok(accepted)
}
