//! MockEngine: the first pipeline stage. Short-circuits with a canned
//! response when a mock rule matches.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::agent::context::TunnelContext;
use crate::agent::pipeline::Stage;
use crate::matcher;
use crate::rules::RuleStore;

pub struct MockEngine {
    store: Arc<RuleStore>,
}

impl MockEngine {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for MockEngine {
    async fn process(&self, ctx: &mut TunnelContext) {
        let rules = self.store.list_mock();
        let hit = rules.into_iter().find(|rule| {
            rule.enabled
                && method_matches(rule.method.as_deref(), &ctx.method)
                && matcher::matches(&rule.path_pattern, &ctx.path)
        });

        if let Some(rule) = hit {
            debug!(rule = %rule.name, path = %ctx.path, "mock rule matched");
            ctx.status = rule.status_code;
            ctx.content_type = rule.content_type.clone();
            ctx.response_body = Bytes::from(rule.response_body.clone());
            ctx.applied_mock_rule = Some(rule.name);
            ctx.is_handled = true;
        }
    }
}

/// A null method filter matches any request method.
pub fn method_matches(filter: Option<&str>, method: &str) -> bool {
    match filter {
        None => true,
        Some(m) => m.eq_ignore_ascii_case(method),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::MockRule;
    use std::collections::HashMap;

    fn rule(pattern: &str, method: Option<&str>) -> MockRule {
        MockRule {
            id: "1".into(),
            name: "users".into(),
            path_pattern: pattern.into(),
            method: method.map(|m| m.to_string()),
            enabled: true,
            status_code: 200,
            content_type: "application/json".into(),
            response_body: "[]".into(),
        }
    }

    #[tokio::test]
    async fn matching_rule_short_circuits() {
        let store = Arc::new(RuleStore::new());
        store.add_mock(rule("/api/users", Some("GET")));
        let engine = MockEngine::new(store);

        let mut ctx = TunnelContext::new(
            crate::protocol::RequestId::new(),
            "GET".into(),
            "/api/users".into(),
            HashMap::new(),
            None,
        );
        engine.process(&mut ctx).await;

        assert!(ctx.is_handled);
        assert_eq!(ctx.status, 200);
        assert_eq!(ctx.content_type, "application/json");
        assert_eq!(ctx.response_body, Bytes::from_static(b"[]"));
        assert_eq!(ctx.applied_mock_rule.as_deref(), Some("users"));
    }

    #[tokio::test]
    async fn null_method_filter_matches_any_method() {
        let store = Arc::new(RuleStore::new());
        store.add_mock(rule("/api/users", None));
        let engine = MockEngine::new(store);

        let mut ctx = TunnelContext::new(
            crate::protocol::RequestId::new(),
            "DELETE".into(),
            "/api/users".into(),
            HashMap::new(),
            None,
        );
        engine.process(&mut ctx).await;
        assert!(ctx.is_handled);
    }

    #[tokio::test]
    async fn no_match_calls_through() {
        let store = Arc::new(RuleStore::new());
        store.add_mock(rule("/api/other", None));
        let engine = MockEngine::new(store);

        let mut ctx = TunnelContext::new(
            crate::protocol::RequestId::new(),
            "GET".into(),
            "/api/users".into(),
            HashMap::new(),
            None,
        );
        engine.process(&mut ctx).await;
        assert!(!ctx.is_handled);
    }
}
