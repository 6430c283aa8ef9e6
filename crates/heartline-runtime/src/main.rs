//! heartline: heartbeat ingestion, distribution relay and terminal pulse monitor.

use clap::Parser;

mod cli;
mod cmd_beat;
mod cmd_watch;
mod server;
mod shutdown;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("HEARTLINE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    // stdout belongs to the watch render line.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        cli::Command::Serve(opts) => {
            tracing::info!("heartline server starting");
            server::run_server(opts).await?;
        }
        cli::Command::Watch(opts) => {
            cmd_watch::cmd_watch(opts).await?;
        }
        cli::Command::Beat(opts) => {
            let accepted = cmd_beat::cmd_beat(&opts).await?;
            println!("{} bpm recorded at {}", accepted.bpm, accepted.timestamp);
        }
    }

    Ok(())
}
