//! Stage 1: resolve the user's pipeline and collection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::debug;

use crate::collab::PipelineResolver;
use crate::config::TimeoutConfig;
use crate::context::SearchContext;
use crate::error::{ResolutionError, StageError};
use crate::presets::select_plan;
use crate::stages::{Stage, StageStatus};

pub struct ResolutionStage {
    resolver: Arc<dyn PipelineResolver>,
    timeouts: TimeoutConfig,
}

impl ResolutionStage {
    pub fn new(resolver: Arc<dyn PipelineResolver>, timeouts: TimeoutConfig) -> Self {
        Self { resolver, timeouts }
    }
}

#[async_trait]
impl Stage for ResolutionStage {
    fn name(&self) -> &'static str {
        "resolution"
    }

    async fn run(&self, ctx: &mut SearchContext) -> Result<StageStatus, StageError> {
        let user_id = ctx.technique_context.identity().user_id;
        let deadline = Duration::from_secs(self.timeouts.resolution_secs);
        let resolved = timeout(deadline, self.resolver.resolve_default_pipeline(user_id))
            .await
            .map_err(|_| ResolutionError::Timeout {
                timeout_secs: self.timeouts.resolution_secs,
            })??;

        debug!(
            pipeline_id = %resolved.pipeline_id,
            collection = %resolved.collection_name,
            "resolved default pipeline"
        );
        ctx.pipeline_id = resolved.pipeline_id;
        ctx.technique_context
            .resolve_collection(resolved.collection_name);
        ctx.plan = select_plan(
            ctx.requested_techniques.as_deref(),
            ctx.requested_preset,
            &resolved.techniques,
            ctx.config_metadata.as_ref(),
        );
        Ok(StageStatus::Completed)
    }
}
