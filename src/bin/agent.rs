//! tunnelforge-agent: the developer-side process. Dials the relay's duplex
//! channel, runs the MockEngine -> ChaosEngine -> RequestRouter ->
//! LocalForwarder pipeline on every request, and forwards to a local service.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;

use tunnelforge::agent::admin::{self, AdminState, AgentState};
use tunnelforge::agent::transport::{self, AgentTransportConfig};
use tunnelforge::agent::build_pipeline;
use tunnelforge::rules::RuleStore;

#[derive(Parser)]
#[command(name = "tunnelforge-agent")]
#[command(about = "Developer-side agent for tunnelforge: tunnels a local service through a relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Duplex channel URL of the relay, e.g. ws://relay.example:8080/tunnel.
    #[arg(long, env = "TUNNELFORGE_RELAY_URL")]
    relay_url: Url,

    /// Label this agent registers under; selects it via the public Host header.
    #[arg(long, env = "TUNNELFORGE_AGENT_ID")]
    agent_id: String,

    /// Port of the local service requests are forwarded to by default.
    #[arg(long, env = "TUNNELFORGE_LOCAL_PORT", default_value_t = 3000)]
    local_port: u16,

    /// Address for this agent's own rule-admin/health listener.
    #[arg(long, env = "TUNNELFORGE_ADMIN_ADDR", default_value = "127.0.0.1:9900")]
    admin_addr: SocketAddr,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short = 'v', long, env = "TUNNELFORGE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let store = Arc::new(RuleStore::new());
    let agent_state = Arc::new(AgentState::new(cli.agent_id.clone()));
    let shutdown = CancellationToken::new();
    let pipeline = Arc::new(build_pipeline(store.clone(), cli.local_port, shutdown.clone()));

    let admin_state = AdminState {
        store: store.clone(),
        agent_state: agent_state.clone(),
    };
    let admin_listener = TcpListener::bind(cli.admin_addr).await?;
    tracing::info!(addr = %cli.admin_addr, "tunnelforge-agent admin surface listening");
    let admin_shutdown = shutdown.clone();
    let admin_task = tokio::spawn(async move {
        let app = admin::router(admin_state);
        axum::serve(admin_listener, app)
            .with_graceful_shutdown(async move { admin_shutdown.cancelled().await })
            .await
    });

    let transport_config = AgentTransportConfig {
        relay_url: cli.relay_url,
        agent_id: cli.agent_id,
    };
    let transport_shutdown = shutdown.clone();
    let transport_task = tokio::spawn(transport::run(
        transport_config,
        store,
        pipeline,
        agent_state,
        transport_shutdown,
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }
    shutdown.cancel();

    let _ = transport_task.await;
    let _ = admin_task.await;

    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
