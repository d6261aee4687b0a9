//! Stage 4: reranking and compression.

use async_trait::async_trait;

use crate::context::SearchContext;
use crate::error::StageError;
use crate::stages::{Stage, StageStatus, RERANKING_WINDOW};

/// Runs the Reranking/Compression window of the technique pipeline.
/// Pass-through when the plan carries no such techniques; technique
/// failures inside the window degrade per technique and never abort.
pub struct RerankingStage;

impl RerankingStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RerankingStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for RerankingStage {
    fn name(&self) -> &'static str {
        "reranking"
    }

    async fn run(&self, ctx: &mut SearchContext) -> Result<StageStatus, StageError> {
        let pipeline = ctx.pipeline.clone();
        let has_window = pipeline
            .as_ref()
            .is_some_and(|p| !p.ids_in_window(RERANKING_WINDOW).is_empty());
        let Some(pipeline) = pipeline.filter(|_| has_window) else {
            return Ok(StageStatus::Skipped);
        };

        pipeline
            .execute_window(RERANKING_WINDOW, &mut ctx.technique_context)
            .await;
        ctx.query_results = ctx.technique_context.retrieved_documents.clone();
        Ok(StageStatus::Completed)
    }
}
