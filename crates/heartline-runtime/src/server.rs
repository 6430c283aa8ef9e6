//! `heartline serve`: ingestion gateway and distribution relay in one process.

use std::time::Duration;

use anyhow::Context;
use heartline_gateway::{AppState, Forwarder, Relay, RelayServer, Store, router};
use tokio_util::sync::CancellationToken;

use crate::cli::ServeOpts;
use crate::shutdown::cancel_on_signal;

/// Run the gateway and relay until ctrl-c or SIGTERM.
pub async fn run_server(opts: ServeOpts) -> anyhow::Result<()> {
    let store = Store::open(&opts.db)
        .with_context(|| format!("failed to open database {}", opts.db.display()))?;
    tracing::info!(path = %opts.db.display(), "database opened");

    let cancel = CancellationToken::new();
    let relay = Relay::new();

    let forwarder = match (&opts.relay_url, &opts.relay_key) {
        (Some(url), Some(key)) => {
            tracing::info!(url = %url, "forwarding heartbeats to external relay");
            Forwarder::remote(url.clone(), key.clone())?
        }
        (Some(_), None) => anyhow::bail!("--relay-url requires --relay-key"),
        (None, _) => Forwarder::Local(relay.clone()),
    };

    let mut state = AppState::new(store, forwarder, &opts.key, &opts.channel);
    if let Some(key) = &opts.relay_key {
        state = state.with_relay_endpoint(relay.clone(), key);
    }

    let relay_server = RelayServer::new(opts.ws_addr, relay, cancel.clone())
        .with_probe_interval(Duration::from_secs(opts.probe_interval))
        .with_max_connections(opts.max_connections);
    let (ws_listener, _) = relay_server
        .bind()
        .await
        .with_context(|| format!("failed to bind relay on {}", opts.ws_addr))?;
    let relay_task = tokio::spawn(async move { relay_server.serve(ws_listener).await });

    let http_listener = tokio::net::TcpListener::bind(opts.http_addr)
        .await
        .with_context(|| format!("failed to bind HTTP on {}", opts.http_addr))?;
    tracing::info!(addr = %opts.http_addr, channel = %opts.channel, "ingestion gateway listening");
    let http_cancel = cancel.clone();
    let http_task = tokio::spawn(async move {
        axum::serve(http_listener, router(state))
            .with_graceful_shutdown(async move { http_cancel.cancelled().await })
            .await
    });

    cancel_on_signal(cancel.clone()).await?;

    match relay_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "relay stopped with error"),
        Err(e) => tracing::error!(error = %e, "relay task panicked"),
    }
    match http_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server stopped with error"),
        Err(e) => tracing::error!(error = %e, "HTTP task panicked"),
    }

    tracing::info!("heartline server stopped");
    Ok(())
}
