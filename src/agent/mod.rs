//! The Agent process: transport client, request pipeline, rule store, and a
//! minimal admin surface.

pub mod admin;
pub mod context;
pub mod incoming;
pub mod pipeline;
pub mod stages;
pub mod transport;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::rules::RuleStore;
use pipeline::Pipeline;
use stages::{chaos::ChaosEngine, forwarder::LocalForwarder, mock::MockEngine, router::RequestRouter};

/// Build the fixed MockEngine -> ChaosEngine -> RequestRouter -> LocalForwarder
/// pipeline against a shared rule store.
pub fn build_pipeline(
    store: Arc<RuleStore>,
    default_local_port: u16,
    cancel: CancellationToken,
) -> Pipeline {
    Pipeline::new(vec![
        Box::new(MockEngine::new(store.clone())),
        Box::new(ChaosEngine::new(store.clone(), cancel)),
        Box::new(RequestRouter::new(store, default_local_port)),
        Box::new(LocalForwarder::new()),
    ])
}
