//! Rule Store: chaos/mock/routing rule collections and the bounded request
//! log, safe for concurrent mutation from the admin surface and concurrent
//! read from the pipeline.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Capacity of the bounded request-log FIFO (spec §3).
pub const REQUEST_LOG_CAPACITY: usize = 200;

/// A latency/error injection policy matched by path and method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaosRule {
    pub id: String,
    pub name: String,
    pub path_pattern: String,
    #[serde(default)]
    pub method: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub jitter_ms: u64,
    #[serde(default)]
    pub error_rate: f64,
    #[serde(default = "default_error_status")]
    pub error_status_code: u16,
    #[serde(default)]
    pub error_body: String,
}

fn default_error_status() -> u16 {
    500
}

/// A canned-response policy that bypasses the local service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockRule {
    pub id: String,
    pub name: String,
    pub path_pattern: String,
    #[serde(default)]
    pub method: Option<String>,
    pub enabled: bool,
    pub status_code: u16,
    pub content_type: String,
    pub response_body: String,
}

/// A target-URL override matched by path with priority ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub id: String,
    pub name: String,
    pub path_pattern: String,
    pub target_base_url: String,
    pub enabled: bool,
    pub priority: i32,
}

/// Immutable snapshot of a completed request, logged for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u64,
    pub applied_chaos_rule: Option<String>,
    pub applied_mock_rule: Option<String>,
    pub target_url: String,
    pub request_headers: HashMap<String, String>,
    pub request_body_preview: String,
    pub request_content_length: usize,
    pub response_headers: HashMap<String, Vec<String>>,
}

/// Result of a replace-by-id or delete-by-id operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    NotFound,
}

/// In-memory collections of chaos, mock and routing rules plus the bounded
/// request log. Readers get a point-in-time `Vec` snapshot; writers hold the
/// lock only long enough to mutate.
#[derive(Default)]
pub struct RuleStore {
    chaos: RwLock<Vec<ChaosRule>>,
    mock: RwLock<Vec<MockRule>>,
    routing: RwLock<Vec<RoutingRule>>,
    log: RwLock<VecDeque<RequestLogEntry>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- chaos rules ----

    pub fn add_chaos(&self, rule: ChaosRule) {
        self.chaos.write().push(rule);
    }

    pub fn list_chaos(&self) -> Vec<ChaosRule> {
        self.chaos.read().clone()
    }

    pub fn update_chaos(&self, id: &str, rule: ChaosRule) -> MutationOutcome {
        let mut rules = self.chaos.write();
        match rules.iter_mut().find(|r| r.id == id) {
            Some(slot) => {
                *slot = rule;
                MutationOutcome::Applied
            }
            None => MutationOutcome::NotFound,
        }
    }

    pub fn delete_chaos(&self, id: &str) -> MutationOutcome {
        let mut rules = self.chaos.write();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        if rules.len() < before {
            MutationOutcome::Applied
        } else {
            MutationOutcome::NotFound
        }
    }

    /// Atomically flip a chaos rule's enabled flag.
    pub fn toggle_chaos(&self, id: &str) -> MutationOutcome {
        let mut rules = self.chaos.write();
        match rules.iter_mut().find(|r| r.id == id) {
            Some(slot) => {
                slot.enabled = !slot.enabled;
                MutationOutcome::Applied
            }
            None => MutationOutcome::NotFound,
        }
    }

    // ---- mock rules ----

    pub fn add_mock(&self, rule: MockRule) {
        self.mock.write().push(rule);
    }

    pub fn list_mock(&self) -> Vec<MockRule> {
        self.mock.read().clone()
    }

    pub fn update_mock(&self, id: &str, rule: MockRule) -> MutationOutcome {
        let mut rules = self.mock.write();
        match rules.iter_mut().find(|r| r.id == id) {
            Some(slot) => {
                *slot = rule;
                MutationOutcome::Applied
            }
            None => MutationOutcome::NotFound,
        }
    }

    pub fn delete_mock(&self, id: &str) -> MutationOutcome {
        let mut rules = self.mock.write();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        if rules.len() < before {
            MutationOutcome::Applied
        } else {
            MutationOutcome::NotFound
        }
    }

    // ---- routing rules ----

    pub fn add_routing(&self, rule: RoutingRule) {
        self.routing.write().push(rule);
    }

    /// Routing rules sorted by priority ascending (stable on ties, so
    /// insertion order breaks ties).
    pub fn list_routing_by_priority(&self) -> Vec<RoutingRule> {
        let mut rules = self.routing.read().clone();
        rules.sort_by_key(|r| r.priority);
        rules
    }

    pub fn list_routing(&self) -> Vec<RoutingRule> {
        self.routing.read().clone()
    }

    pub fn update_routing(&self, id: &str, rule: RoutingRule) -> MutationOutcome {
        let mut rules = self.routing.write();
        match rules.iter_mut().find(|r| r.id == id) {
            Some(slot) => {
                *slot = rule;
                MutationOutcome::Applied
            }
            None => MutationOutcome::NotFound,
        }
    }

    pub fn delete_routing(&self, id: &str) -> MutationOutcome {
        let mut rules = self.routing.write();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        if rules.len() < before {
            MutationOutcome::Applied
        } else {
            MutationOutcome::NotFound
        }
    }

    // ---- request log ----

    /// Append a log entry, evicting the oldest entry if over capacity.
    pub fn append_log(&self, entry: RequestLogEntry) {
        let mut log = self.log.write();
        log.push_front(entry);
        while log.len() > REQUEST_LOG_CAPACITY {
            log.pop_back();
        }
    }

    /// Recent entries, newest first.
    pub fn recent_log(&self, limit: Option<usize>) -> Vec<RequestLogEntry> {
        let log = self.log.read();
        let take = limit.unwrap_or(log.len()).min(log.len());
        log.iter().take(take).cloned().collect()
    }

    pub fn clear_log(&self) {
        self.log.write().clear();
    }
}
