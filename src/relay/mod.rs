//! The Relay process: the Intake loop that accepts Agent duplex channels and
//! the Public HTTP Front that proxies inbound traffic over them.

pub mod admin;
pub mod pending;
pub mod proxy;
pub mod registry;
pub mod transport;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use pending::{ActiveChannelTable, PendingTable};
use registry::AgentRegistry;

/// Shared state for both the intake (ws) router and the public HTTP front.
#[derive(Clone)]
pub struct RelayState {
    pub registry: Arc<AgentRegistry>,
    pub pending: Arc<PendingTable>,
    pub active: Arc<ActiveChannelTable>,
}

impl RelayState {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(AgentRegistry::new()),
            pending: Arc::new(PendingTable::new()),
            active: Arc::new(ActiveChannelTable::new()),
        }
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the full relay router: the `/tunnel` duplex upgrade, the `/__admin`
/// observability surface, and a catch-all that proxies every other request to
/// whichever agent the `Host` header selects (spec.md §4.2).
pub fn app(state: RelayState) -> Router {
    Router::new()
        .route("/tunnel", get(transport::ws_upgrade))
        .merge(admin::routes())
        .fallback(proxy::handle_public_request)
        .with_state(state)
}
