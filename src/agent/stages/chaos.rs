//! ChaosEngine: the second pipeline stage. Injects latency and/or a
//! probabilistic synthetic error for requests matching a chaos rule.
//!
//! The source design mixes a Gaussian latency helper (used elsewhere in the
//! system) with uniform jitter in the chaos path. This engine always uses
//! uniform `[latency-jitter, latency+jitter]` jitter, clamped to >= 0, as
//! spec.md §4.4.2/§9 directs; the Gaussian helper is out of scope here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::context::TunnelContext;
use crate::agent::pipeline::Stage;
use crate::agent::stages::mock::method_matches;
use crate::matcher;
use crate::rules::RuleStore;

pub struct ChaosEngine {
    store: Arc<RuleStore>,
    cancel: CancellationToken,
}

impl ChaosEngine {
    pub fn new(store: Arc<RuleStore>, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }
}

/// Draw a jittered delay: `latency_ms + uniform(-jitter_ms, +jitter_ms)`,
/// clamped to `>= 0`.
pub fn jittered_delay_ms(latency_ms: u64, jitter_ms: u64) -> u64 {
    if jitter_ms == 0 {
        return latency_ms;
    }
    let jitter = jitter_ms as i64;
    let offset = rand::rng().random_range(-jitter..=jitter);
    (latency_ms as i64 + offset).max(0) as u64
}

#[async_trait]
impl Stage for ChaosEngine {
    async fn process(&self, ctx: &mut TunnelContext) {
        let rules = self.store.list_chaos();
        let hit = rules.into_iter().find(|rule| {
            rule.enabled
                && method_matches(rule.method.as_deref(), &ctx.method)
                && matcher::matches(&rule.path_pattern, &ctx.path)
        });

        let Some(rule) = hit else {
            return;
        };

        debug!(rule = %rule.name, path = %ctx.path, "chaos rule matched");
        ctx.applied_chaos_rule = Some(rule.name.clone());

        if rule.latency_ms > 0 {
            let delay_ms = jittered_delay_ms(rule.latency_ms, rule.jitter_ms);
            if delay_ms > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                    _ = self.cancel.cancelled() => {
                        debug!("chaos latency sleep cancelled");
                    }
                }
            }
        }

        if rule.error_rate > 0.0 {
            let draw: f64 = rand::rng().random();
            if draw < rule.error_rate {
                warn!(rule = %rule.name, status = rule.error_status_code, "injecting chaos error");
                ctx.status = rule.error_status_code;
                ctx.content_type = "text/plain".to_string();
                ctx.response_body = Bytes::from(rule.error_body.clone());
                ctx.is_handled = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ChaosRule;
    use std::collections::HashMap;

    fn rule(latency_ms: u64, jitter_ms: u64, error_rate: f64) -> ChaosRule {
        ChaosRule {
            id: "1".into(),
            name: "slow".into(),
            path_pattern: "/slow".into(),
            method: None,
            enabled: true,
            latency_ms,
            jitter_ms,
            error_rate,
            error_status_code: 503,
            error_body: "nope".into(),
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        for _ in 0..20 {
            assert_eq!(jittered_delay_ms(100, 0), 100);
        }
    }

    #[test]
    fn jitter_stays_within_bounds_and_nonnegative() {
        for _ in 0..200 {
            let d = jittered_delay_ms(50, 20);
            assert!((30..=70).contains(&d));
        }
        for _ in 0..200 {
            let d = jittered_delay_ms(5, 50);
            assert!(d <= 55);
        }
    }

    #[tokio::test]
    async fn error_rate_one_always_injects() {
        let store = Arc::new(RuleStore::new());
        store.add_chaos(rule(0, 0, 1.0));
        let engine = ChaosEngine::new(store, CancellationToken::new());

        let mut ctx = TunnelContext::new(
            crate::protocol::RequestId::new(),
            "GET".into(),
            "/slow".into(),
            HashMap::new(),
            None,
        );
        engine.process(&mut ctx).await;

        assert!(ctx.is_handled);
        assert_eq!(ctx.status, 503);
        assert_eq!(ctx.content_type, "text/plain");
        assert_eq!(ctx.response_body, Bytes::from_static(b"nope"));
        assert_eq!(ctx.applied_chaos_rule.as_deref(), Some("slow"));
    }

    #[tokio::test]
    async fn error_rate_zero_never_injects() {
        let store = Arc::new(RuleStore::new());
        store.add_chaos(rule(0, 0, 0.0));
        let engine = ChaosEngine::new(store, CancellationToken::new());

        let mut ctx = TunnelContext::new(
            crate::protocol::RequestId::new(),
            "GET".into(),
            "/slow".into(),
            HashMap::new(),
            None,
        );
        engine.process(&mut ctx).await;

        assert!(!ctx.is_handled);
        assert_eq!(ctx.applied_chaos_rule.as_deref(), Some("slow"));
    }

    #[tokio::test]
    async fn latency_delays_by_approximately_configured_amount() {
        let store = Arc::new(RuleStore::new());
        store.add_chaos(rule(100, 0, 0.0));
        let engine = ChaosEngine::new(store, CancellationToken::new());

        let mut ctx = TunnelContext::new(
            crate::protocol::RequestId::new(),
            "GET".into(),
            "/slow".into(),
            HashMap::new(),
            None,
        );
        let start = std::time::Instant::now();
        engine.process(&mut ctx).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(90));
        assert!(elapsed < Duration::from_millis(400));
    }
}
