//! RequestRouter: the third pipeline stage. Resolves the outbound target URL
//! and never short-circuits.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::agent::context::TunnelContext;
use crate::agent::pipeline::Stage;
use crate::matcher;
use crate::rules::RuleStore;

pub struct RequestRouter {
    store: Arc<RuleStore>,
    default_local_port: u16,
}

impl RequestRouter {
    pub fn new(store: Arc<RuleStore>, default_local_port: u16) -> Self {
        Self {
            store,
            default_local_port,
        }
    }
}

#[async_trait]
impl Stage for RequestRouter {
    async fn process(&self, ctx: &mut TunnelContext) {
        let rules = self.store.list_routing_by_priority();
        let hit = rules
            .into_iter()
            .find(|rule| rule.enabled && matcher::matches(&rule.path_pattern, &ctx.path));

        ctx.target_url = match hit {
            Some(rule) => {
                let base = rule.target_base_url.trim_end_matches('/');
                debug!(rule = %rule.name, target = %base, "routing rule matched");
                format!("{base}{}", ctx.path)
            }
            None => format!("http://localhost:{}{}", self.default_local_port, ctx.path),
        };
    }
}
