//! Minimal observability surface for the Relay: which agents are currently
//! online. There is no rule store on this side of the tunnel -- chaos, mock
//! and routing rules live entirely on the Agent (spec.md §4.5).

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::relay::RelayState;

/// Routes merged into the main relay router before `with_state` is applied.
pub fn routes() -> Router<RelayState> {
    Router::new().route("/healthz", get(healthz))
}

async fn healthz(State(state): State<RelayState>) -> Json<Value> {
    Json(json!({
        "agents_online": state.registry.online_count(),
    }))
}
