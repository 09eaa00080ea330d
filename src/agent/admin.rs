//! Minimal rule-administration and health surface for the Agent.
//!
//! spec.md §1 names the CRUD REST surface an external collaborator and out
//! of scope for the core; this router is the smallest possible shim that
//! makes the in-memory `RuleStore` reachable so the agent is demonstrable
//! end to end (see SPEC_FULL.md §11-12). It does no authentication and only
//! as much validation as "does this id exist".

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::rules::{ChaosRule, MockRule, MutationOutcome, RoutingRule, RuleStore};

/// Agent connection state, surfaced at `/healthz`.
#[derive(Default)]
pub struct AgentState {
    connected: AtomicBool,
    reconnect_count: AtomicU64,
    agent_id: String,
}

impl AgentState {
    pub fn new(agent_id: String) -> Self {
        Self {
            connected: AtomicBool::new(false),
            reconnect_count: AtomicU64::new(0),
            agent_id,
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn record_reconnect(&self) {
        self.reconnect_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<RuleStore>,
    pub agent_state: Arc<AgentState>,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/__admin/log", get(list_log).delete(clear_log))
        .route("/__admin/rules/chaos", get(list_chaos).post(create_chaos))
        .route(
            "/__admin/rules/chaos/{id}",
            put(update_chaos).delete(delete_chaos),
        )
        .route("/__admin/rules/chaos/{id}/toggle", post(toggle_chaos))
        .route("/__admin/rules/mock", get(list_mock).post(create_mock))
        .route(
            "/__admin/rules/mock/{id}",
            put(update_mock).delete(delete_mock),
        )
        .route("/__admin/rules/routing", get(list_routing).post(create_routing))
        .route(
            "/__admin/rules/routing/{id}",
            put(update_routing).delete(delete_routing),
        )
        .with_state(state)
}

async fn healthz(State(state): State<AdminState>) -> Json<Value> {
    Json(json!({
        "connected": state.agent_state.is_connected(),
        "agent_id": state.agent_state.agent_id,
        "reconnect_count": state.agent_state.reconnect_count(),
    }))
}

async fn list_log(State(state): State<AdminState>) -> Json<Value> {
    Json(json!({ "entries": state.store.recent_log(None) }))
}

async fn clear_log(State(state): State<AdminState>) -> StatusCode {
    state.store.clear_log();
    StatusCode::NO_CONTENT
}

fn outcome_status(outcome: MutationOutcome) -> StatusCode {
    match outcome {
        MutationOutcome::Applied => StatusCode::OK,
        MutationOutcome::NotFound => StatusCode::NOT_FOUND,
    }
}

async fn list_chaos(State(state): State<AdminState>) -> Json<Vec<ChaosRule>> {
    Json(state.store.list_chaos())
}

async fn create_chaos(State(state): State<AdminState>, Json(rule): Json<ChaosRule>) -> StatusCode {
    state.store.add_chaos(rule);
    StatusCode::CREATED
}

async fn update_chaos(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(rule): Json<ChaosRule>,
) -> StatusCode {
    outcome_status(state.store.update_chaos(&id, rule))
}

async fn delete_chaos(State(state): State<AdminState>, Path(id): Path<String>) -> StatusCode {
    outcome_status(state.store.delete_chaos(&id))
}

async fn toggle_chaos(State(state): State<AdminState>, Path(id): Path<String>) -> StatusCode {
    outcome_status(state.store.toggle_chaos(&id))
}

async fn list_mock(State(state): State<AdminState>) -> Json<Vec<MockRule>> {
    Json(state.store.list_mock())
}

async fn create_mock(State(state): State<AdminState>, Json(rule): Json<MockRule>) -> StatusCode {
    state.store.add_mock(rule);
    StatusCode::CREATED
}

async fn update_mock(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(rule): Json<MockRule>,
) -> StatusCode {
    outcome_status(state.store.update_mock(&id, rule))
}

async fn delete_mock(State(state): State<AdminState>, Path(id): Path<String>) -> StatusCode {
    outcome_status(state.store.delete_mock(&id))
}

async fn list_routing(State(state): State<AdminState>) -> Json<Vec<RoutingRule>> {
    Json(state.store.list_routing_by_priority())
}

async fn create_routing(
    State(state): State<AdminState>,
    Json(rule): Json<RoutingRule>,
) -> StatusCode {
    state.store.add_routing(rule);
    StatusCode::CREATED
}

async fn update_routing(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(rule): Json<RoutingRule>,
) -> StatusCode {
    outcome_status(state.store.update_routing(&id, rule))
}

async fn delete_routing(State(state): State<AdminState>, Path(id): Path<String>) -> StatusCode {
    outcome_status(state.store.delete_routing(&id))
}
