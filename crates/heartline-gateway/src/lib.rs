//! Collaborators around the heartbeat channel: the SQLite history, the
//! WebSocket distribution relay and the HTTP ingestion gateway.

pub mod error;
pub mod forward;
pub mod ingest;
pub mod relay;
pub mod store;

pub use error::GatewayError;
pub use forward::{Forwarder, PublishRequest};
pub use ingest::{AppState, router};
pub use relay::{Publication, Relay, RelayServer};
pub use store::Store;
