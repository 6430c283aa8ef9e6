use tokio_util::sync::CancellationToken;

/// Cancel `cancel` on ctrl-c or SIGTERM. Runs until one arrives.
pub async fn cancel_on_signal(cancel: CancellationToken) -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            () = cancel.cancelled() => return Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
            () = cancel.cancelled() => return Ok(()),
        }
    }

    cancel.cancel();
    Ok(())
}
