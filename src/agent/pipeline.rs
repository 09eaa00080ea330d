//! Four-stage request pipeline: MockEngine -> ChaosEngine -> RequestRouter ->
//! LocalForwarder, with short-circuit semantics on `TunnelContext::is_handled`.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::context::TunnelContext;

/// One stage of the pipeline. A stage may mutate the context and/or set
/// `is_handled` to short-circuit the remaining stages.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn process(&self, ctx: &mut TunnelContext);
}

/// Runs the fixed MockEngine -> ChaosEngine -> RequestRouter -> LocalForwarder
/// chain, checking `is_handled` before invoking each subsequent stage.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub async fn run(&self, ctx: &mut TunnelContext) {
        for stage in &self.stages {
            if ctx.is_handled {
                break;
            }
            stage.process(ctx).await;
        }
    }
}

/// Shared by stages that need to honor pipeline-wide cancellation (chaos
/// latency sleeps, the outbound HTTP call).
#[derive(Clone)]
pub struct PipelineCancellation(pub CancellationToken);

impl Default for PipelineCancellation {
    fn default() -> Self {
        Self(CancellationToken::new())
    }
}
