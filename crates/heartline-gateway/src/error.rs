use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("forward request failed: {0}")]
    Forward(#[from] reqwest::Error),

    #[error("relay rejected publication with status {0}")]
    ForwardStatus(reqwest::StatusCode),
}
