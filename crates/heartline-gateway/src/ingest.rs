//! HTTP ingestion gateway: accepts authenticated samples, persists them,
//! forwards them to the distribution channel and serves the history used to
//! seed observers.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use heartline_core::heartbeat::is_valid_bpm;
use heartline_core::{Heartbeat, HeartbeatRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::forward::{Forwarder, PublishRequest};
use crate::relay::Relay;
use crate::store::Store;

/// Largest history window `GET /{x}` serves.
pub const MAX_HISTORY: i64 = 100;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<Store>>,
    forwarder: Forwarder,
    ingest_key: Arc<str>,
    channel: Arc<str>,
    /// In-process relay exposed through `POST /relay/publish`, with its key.
    relay: Option<(Relay, Arc<str>)>,
}

impl AppState {
    pub fn new(store: Store, forwarder: Forwarder, ingest_key: &str, channel: &str) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            forwarder,
            ingest_key: Arc::from(ingest_key),
            channel: Arc::from(channel),
            relay: None,
        }
    }

    /// Accept external publications for `relay`, authenticated by `key`.
    pub fn with_relay_endpoint(mut self, relay: Relay, key: &str) -> Self {
        self.relay = Some((relay, Arc::from(key)));
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(latest).post(ingest))
        .route("/{x}", get(history).post(ingest_legacy))
        .route("/relay/publish", post(relay_publish))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no heartbeat recorded")]
    Empty,
    #[error("Invalid number!")]
    InvalidNumber,
    #[error("Must be more than 0!")]
    NotPositive,
    #[error("Must be 100 or less!")]
    TooLarge,
    #[error("unauthorized")]
    Unauthorized,
    #[error("relay endpoint disabled")]
    RelayDisabled,
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Empty | Self::RelayDisabled => StatusCode::NOT_FOUND,
            Self::InvalidNumber | Self::NotPositive | Self::TooLarge => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Store(e) = &self {
            tracing::error!(error = %e, "ingest: store failure");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct IngestBody {
    pub bpm: f64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct IngestResponse {
    pub bpm: f64,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub data: Vec<HeartbeatRecord>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishResponse {
    pub delivered: usize,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn latest(State(state): State<AppState>) -> Result<Json<HeartbeatRecord>, ApiError> {
    let record = state.store.lock().await.latest()?;
    record.map(Json).ok_or(ApiError::Empty)
}

async fn history(
    State(state): State<AppState>,
    Path(x): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = parse_history_limit(&x)?;
    let data = state.store.lock().await.recent(limit)?;
    Ok(Json(HistoryResponse { data }))
}

async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<IngestBody>, JsonRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    if bearer_token(&headers) != Some(&*state.ingest_key) {
        return Err(ApiError::Unauthorized);
    }
    accept_sample(&state, body).await
}

async fn ingest_legacy(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Result<Json<IngestBody>, JsonRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    if key != *state.ingest_key {
        return Err(ApiError::Unauthorized);
    }
    accept_sample(&state, body).await
}

async fn relay_publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    let Some((relay, key)) = &state.relay else {
        return Err(ApiError::RelayDisabled);
    };
    if bearer_token(&headers) != Some(&**key) {
        return Err(ApiError::Unauthorized);
    }
    let delivered = relay.publish(request.channels, request.message);
    Ok(Json(PublishResponse { delivered }))
}

async fn accept_sample(
    state: &AppState,
    body: Result<Json<IngestBody>, JsonRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let bpm = match body {
        Ok(Json(body)) if is_valid_bpm(body.bpm) => body.bpm,
        Ok(Json(body)) => {
            tracing::debug!(bpm = body.bpm, "ingest: rejected bpm");
            return Err(ApiError::InvalidNumber);
        }
        Err(rejection) => {
            tracing::debug!(error = %rejection, "ingest: rejected body");
            return Err(ApiError::InvalidNumber);
        }
    };

    let timestamp = chrono::Utc::now().timestamp_millis();
    let record = state.store.lock().await.insert(bpm, timestamp)?;
    tracing::info!(id = record.id, bpm, timestamp, "heartbeat recorded");

    let heartbeat = Heartbeat::from(record);
    if let Err(e) = state.forwarder.forward(&state.channel, &heartbeat).await {
        tracing::warn!(error = %e, channel = %state.channel, "heartbeat forward failed");
    }

    Ok(Json(IngestResponse { bpm, timestamp }))
}

fn parse_history_limit(raw: &str) -> Result<u32, ApiError> {
    let x: i64 = raw.trim().parse().map_err(|_| ApiError::InvalidNumber)?;
    if x < 1 {
        return Err(ApiError::NotPositive);
    }
    if x > MAX_HISTORY {
        return Err(ApiError::TooLarge);
    }
    u32::try_from(x).map_err(|_| ApiError::TooLarge)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
