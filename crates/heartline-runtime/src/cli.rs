//! CLI definition using clap derive. Every setting also reads an environment
//! variable.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use heartline_core::DEFAULT_CHANNEL;

#[derive(Parser)]
#[command(name = "heartline", about = "Heartbeat relay and pulse monitor")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the ingestion gateway and the distribution relay
    Serve(ServeOpts),
    /// Follow the live heartbeat in the terminal
    Watch(WatchOpts),
    /// Record one bpm sample
    Beat(BeatOpts),
}

#[derive(clap::Args)]
pub struct ServeOpts {
    /// Shared secret required to post samples
    #[arg(long, env = "HEARTLINE_KEY", hide_env_values = true)]
    pub key: String,

    /// HTTP listen address of the ingestion gateway
    #[arg(long, env = "HEARTLINE_HTTP_ADDR", default_value = "127.0.0.1:8080")]
    pub http_addr: SocketAddr,

    /// WebSocket listen address of the relay
    #[arg(long, env = "HEARTLINE_WS_ADDR", default_value = "127.0.0.1:8081")]
    pub ws_addr: SocketAddr,

    /// SQLite database path
    #[arg(long, env = "HEARTLINE_DB", default_value = "heartline.sqlite")]
    pub db: PathBuf,

    /// Channel accepted samples are published on
    #[arg(long, env = "HEARTLINE_CHANNEL", default_value = DEFAULT_CHANNEL)]
    pub channel: String,

    /// Forward samples to an external relay's publish endpoint instead of the
    /// in-process one
    #[arg(long, env = "HEARTLINE_RELAY_URL", requires = "relay_key")]
    pub relay_url: Option<String>,

    /// Bearer key for the external relay, and for `POST /relay/publish`
    #[arg(long, env = "HEARTLINE_RELAY_KEY", hide_env_values = true)]
    pub relay_key: Option<String>,

    /// Seconds between relay liveness probes
    #[arg(
        long,
        env = "HEARTLINE_PROBE_INTERVAL",
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub probe_interval: u64,

    /// Maximum concurrent relay subscribers
    #[arg(long, env = "HEARTLINE_MAX_CONNECTIONS", default_value = "1024")]
    pub max_connections: usize,
}

#[derive(clap::Args)]
pub struct WatchOpts {
    /// Relay WebSocket URL
    #[arg(long, env = "HEARTLINE_GATEWAY_URL", default_value = "ws://127.0.0.1:8081")]
    pub gateway_url: String,

    /// Ingestion gateway URL used to fetch the seed heartbeat
    #[arg(long, env = "HEARTLINE_API_URL", default_value = "http://127.0.0.1:8080/")]
    pub api_url: String,

    /// Channel to subscribe to
    #[arg(long, env = "HEARTLINE_CHANNEL", default_value = DEFAULT_CHANNEL)]
    pub channel: String,

    /// Start with the terminal bell enabled (Enter toggles it)
    #[arg(long)]
    pub sound: bool,
}

#[derive(clap::Args)]
pub struct BeatOpts {
    /// Beats per minute
    pub bpm: f64,

    /// Ingestion gateway URL
    #[arg(long, env = "HEARTLINE_API_URL", default_value = "http://127.0.0.1:8080/")]
    pub api_url: String,

    /// Shared ingestion secret
    #[arg(long, env = "HEARTLINE_KEY", hide_env_values = true)]
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn serve_defaults() {
        let cli = parse(&["heartline", "serve", "--key", "k"]);
        let Command::Serve(opts) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(opts.key, "k");
        assert_eq!(opts.http_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(opts.ws_addr, "127.0.0.1:8081".parse().unwrap());
        assert_eq!(opts.probe_interval, 30);
        assert_eq!(opts.max_connections, 1024);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let result = Cli::try_parse_from(["heartline", "serve", "--key", "k", "--probe-interval", "0"]);
        assert!(result.is_err());

        let cli = parse(&["heartline", "serve", "--key", "k", "--probe-interval", "1"]);
        let Command::Serve(opts) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(opts.probe_interval, 1);
    }

    #[test]
    fn every_serve_setting_reads_env() {
        use clap::CommandFactory;

        let cli = Cli::command();
        let serve = cli.find_subcommand("serve").unwrap();
        let missing: Vec<&str> = serve
            .get_arguments()
            .filter(|arg| !arg.is_positional() && arg.get_id() != "help")
            .filter(|arg| arg.get_env().is_none())
            .map(|arg| arg.get_id().as_str())
            .collect();
        assert!(missing.is_empty(), "no env fallback for {missing:?}");

        let env_of = |id: &str| {
            serve
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .map(|env| env.to_string_lossy().into_owned())
        };
        assert_eq!(env_of("probe_interval").as_deref(), Some("HEARTLINE_PROBE_INTERVAL"));
        assert_eq!(env_of("max_connections").as_deref(), Some("HEARTLINE_MAX_CONNECTIONS"));
    }

    #[test]
    fn relay_url_requires_relay_key() {
        let result = Cli::try_parse_from([
            "heartline",
            "serve",
            "--key",
            "k",
            "--relay-url",
            "https://relay.example/publish",
        ]);
        if std::env::var_os("HEARTLINE_RELAY_KEY").is_none() {
            assert!(result.is_err());
        }
    }

    #[test]
    fn watch_starts_muted_by_default() {
        let cli = parse(&["heartline", "watch"]);
        let Command::Watch(opts) = cli.command else {
            panic!("expected watch");
        };
        assert!(!opts.sound);

        let cli = parse(&["heartline", "watch", "--sound", "--channel", "other"]);
        let Command::Watch(opts) = cli.command else {
            panic!("expected watch");
        };
        assert!(opts.sound);
        assert_eq!(opts.channel, "other");
    }

    #[test]
    fn beat_takes_positional_bpm() {
        let cli = parse(&["heartline", "beat", "72.5", "--key", "k"]);
        let Command::Beat(opts) = cli.command else {
            panic!("expected beat");
        };
        assert!((opts.bpm - 72.5).abs() < f64::EPSILON);
    }
}
