//! tunnelforge-relay: the public-facing process. Accepts Agent duplex
//! upgrades on `/tunnel` and proxies public HTTP traffic to whichever agent
//! the request's `Host` header selects.

use std::net::SocketAddr;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use tunnelforge::relay::{self, RelayState};

#[derive(Parser)]
#[command(name = "tunnelforge-relay")]
#[command(about = "Public relay for tunnelforge: accepts agent connections and proxies inbound HTTP")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Address to bind the public HTTP + duplex-upgrade listener on.
    #[arg(long, env = "TUNNELFORGE_RELAY_ADDR", default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short = 'v', long, env = "TUNNELFORGE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let state = RelayState::new();
    let app = relay::app(state);

    let listener = TcpListener::bind(cli.addr).await?;
    tracing::info!(addr = %cli.addr, "tunnelforge-relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
