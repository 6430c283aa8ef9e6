//! Hand-off of accepted samples to the distribution channel.

use std::time::Duration;

use heartline_core::Heartbeat;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::relay::Relay;

const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of a relay publish request: an opaque message for a set of channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub channels: Vec<String>,
    pub message: String,
}

/// Where accepted heartbeats go after they are stored.
#[derive(Clone)]
pub enum Forwarder {
    /// Publish through the relay running in this process.
    Local(Relay),
    /// POST to an external relay's publish endpoint.
    Remote {
        client: reqwest::Client,
        url: String,
        key: String,
    },
    /// Store only.
    Disabled,
}

impl Forwarder {
    pub fn remote(url: impl Into<String>, key: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(FORWARD_TIMEOUT).build()?;
        Ok(Self::Remote {
            client,
            url: url.into(),
            key: key.into(),
        })
    }

    /// Publish `heartbeat` on `channel` as a `{"bpm","at"}` payload.
    pub async fn forward(&self, channel: &str, heartbeat: &Heartbeat) -> Result<(), GatewayError> {
        let request = PublishRequest {
            channels: vec![channel.to_string()],
            message: heartbeat.to_payload(),
        };

        match self {
            Self::Local(relay) => {
                let delivered = relay.publish(request.channels, request.message);
                tracing::debug!(channel, delivered, "forwarded heartbeat to local relay");
            }
            Self::Remote { client, url, key } => {
                let resp = client.post(url).bearer_auth(key).json(&request).send().await?;
                if !resp.status().is_success() {
                    return Err(GatewayError::ForwardStatus(resp.status()));
                }
                tracing::debug!(channel, url = %url, "forwarded heartbeat to remote relay");
            }
            Self::Disabled => {}
        }
        Ok(())
    }
}
