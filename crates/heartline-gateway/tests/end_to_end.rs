//! Ingestion → relay → subscriber session, over real loopback sockets.

use std::net::SocketAddr;
use std::time::Duration;

use heartline_core::Heartbeat;
use heartline_core::session::ConnectionStatus;
use heartline_gateway::{AppState, Forwarder, Relay, RelayServer, Store, router};
use heartline_session::{Session, SessionConfig};
use tokio_util::sync::CancellationToken;

const KEY: &str = "ingest-secret";
const CHANNEL: &str = "nobu_health";
const WAIT: Duration = Duration::from_secs(5);

struct Stack {
    http: SocketAddr,
    ws: SocketAddr,
    cancel: CancellationToken,
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn start_stack() -> Stack {
    let cancel = CancellationToken::new();
    let relay = Relay::new();

    let server = RelayServer::new("127.0.0.1:0".parse().unwrap(), relay.clone(), cancel.clone());
    let (listener, ws) = server.bind().await.unwrap();
    tokio::spawn(async move { server.serve(listener).await });

    let state = AppState::new(Store::open_in_memory().unwrap(), Forwarder::Local(relay), KEY, CHANNEL);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http = listener.local_addr().unwrap();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        axum::serve(listener, router(state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    });

    Stack { http, ws, cancel }
}

async fn post_bpm(http: SocketAddr, bpm: f64) -> i64 {
    let resp = reqwest::Client::new()
        .post(format!("http://{http}/"))
        .bearer_auth(KEY)
        .json(&serde_json::json!({ "bpm": bpm }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    body["timestamp"].as_i64().unwrap()
}

#[tokio::test]
async fn posted_heartbeat_reaches_subscribed_session() {
    let stack = start_stack().await;
    let seed = Heartbeat { bpm: 60.0, timestamp: 0 };
    let session = Session::connect(
        SessionConfig {
            url: format!("ws://{}", stack.ws),
            channel: CHANNEL.into(),
        },
        seed,
    );

    let mut status = session.status();
    tokio::time::timeout(WAIT, status.wait_for(|s| *s == ConnectionStatus::Open))
        .await
        .expect("session never opened")
        .unwrap();

    // The relay registers the subscription asynchronously; keep posting
    // until one publication lands.
    let mut heartbeat = session.heartbeat();
    tokio::time::timeout(WAIT, async {
        loop {
            post_bpm(stack.http, 88.0).await;
            if tokio::time::timeout(Duration::from_millis(100), heartbeat.changed()).await.is_ok() {
                return;
            }
        }
    })
    .await
    .expect("publication never reached the session");

    let latest = session.latest();
    assert_eq!(latest.bpm, 88.0);
    assert!(latest.timestamp > seed.timestamp);

    session.close().await;
    assert_eq!(*status.borrow(), ConnectionStatus::Closed);
}

#[tokio::test]
async fn session_seed_comes_from_latest_record() {
    let stack = start_stack().await;
    let at = post_bpm(stack.http, 71.5).await;

    let seed = heartline_session::seed::fetch_latest(&format!("http://{}/", stack.http))
        .await
        .unwrap();
    assert_eq!(seed, Heartbeat { bpm: 71.5, timestamp: at });
}
