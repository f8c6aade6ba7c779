//! Tandem Signal Server
//!
//! WebSocket signaling relay for up to two streamers and any number of watchers.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (port 8000, or $PORT)
//! tandem-signal
//!
//! # Explicit config file and overrides
//! tandem-signal --config /etc/tandem/config.toml --port 9000 --slow-peer disconnect
//!
//! # Show the effective configuration as TOML and exit
//! tandem-signal --port 9000 --print-config > config.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tandem_core::{PublisherOverflow, RelayConfig, SlowPeerPolicy};
use tandem_signal::SignalServer;

#[derive(Parser, Debug)]
#[command(name = "tandem-signal")]
#[command(about = "WebRTC signaling relay for streamers and watchers")]
#[command(version)]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory holding stream.html and watch.html
    #[arg(long)]
    public_dir: Option<PathBuf>,

    /// Streamer slots available at once
    #[arg(long)]
    max_publishers: Option<usize>,

    /// What to do when a client's outbound queue is full (drop|disconnect)
    #[arg(long)]
    slow_peer: Option<SlowPeerPolicy>,

    /// What to do with a streamer join when every slot is taken (ignore|downgrade|reject)
    #[arg(long)]
    publisher_overflow: Option<PublisherOverflow>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => RelayConfig::load(),
        };

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = &self.bind {
            config.bind = bind
                .parse()
                .with_context(|| format!("invalid bind address: {}", bind))?;
        }
        if let Some(dir) = self.public_dir {
            config.public_dir = dir;
        }
        if let Some(max) = self.max_publishers {
            config.max_publishers = max;
        }
        if let Some(policy) = self.slow_peer {
            config.slow_peer = policy;
        }
        if let Some(policy) = self.publisher_overflow {
            config.publisher_overflow = policy;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let print_config = args.print_config;
    // Log lines would land in the printed TOML
    if !print_config {
        init_logging(args.json_logs);
    }

    let config = args.into_config()?;
    if print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let addr = SocketAddr::new(config.bind, config.port);

    info!("Starting Tandem Signal Server");
    info!(
        "Streamer slots: {}, slow peers: {}, streamer overflow: {}",
        config.max_publishers, config.slow_peer, config.publisher_overflow
    );
    info!("Serving pages from {:?}", config.public_dir);

    let server = SignalServer::new(&config);
    server.serve(addr).await?;

    Ok(())
}
