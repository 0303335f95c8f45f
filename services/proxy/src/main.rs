//! pgrelay binary.
//!
//! Parses the listen/upstream addresses, initializes tracing, and runs the
//! proxy listener until the process is terminated.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pgrelay_proxy::proxy::Listener;
use pgrelay_proxy::ProxyConfig;

#[derive(Debug, Parser)]
#[command(name = "pgrelay", about = "Transparent PostgreSQL wire-protocol proxy")]
struct Args {
    /// Address to accept client connections on.
    #[arg(long, env = "PGRELAY_LISTEN", default_value = "0.0.0.0:6432")]
    listen: String,

    /// Address of the upstream PostgreSQL server.
    #[arg(long, env = "PGRELAY_UPSTREAM", default_value = "127.0.0.1:5432")]
    upstream: String,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, env = "PGRELAY_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| args.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pgrelay");

    let config = ProxyConfig {
        listen_addr: args.listen,
        upstream_addr: args.upstream,
    };
    info!(
        listen_addr = %config.listen_addr,
        upstream_addr = %config.upstream_addr,
        "Configuration loaded"
    );

    let listener = Listener::bind(config)
        .await
        .context("failed to bind listen address")?;

    Arc::new(listener).run().await.context("listener failed")
}
