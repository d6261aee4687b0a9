//! Stage 3: retrieval.
//!
//! Runs the Retrieval/PostRetrieval window of the technique pipeline, or
//! a direct retriever call when the plan has no retrieval techniques.
//! This stage is fatal when nothing could be retrieved because every
//! retrieval technique failed; an empty result set is not a failure.

use async_trait::async_trait;

use crate::config::RetrievalConfig;
use crate::context::SearchContext;
use crate::error::{RetrievalError, StageError};
use crate::stages::{Stage, StageStatus, RETRIEVAL_WINDOW};

pub struct RetrievalStage {
    config: RetrievalConfig,
}

impl RetrievalStage {
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Stage for RetrievalStage {
    fn name(&self) -> &'static str {
        "retrieval"
    }

    async fn run(&self, ctx: &mut SearchContext) -> Result<StageStatus, StageError> {
        let pipeline = ctx.pipeline.clone();
        let has_window = pipeline
            .as_ref()
            .is_some_and(|p| !p.ids_in_window(RETRIEVAL_WINDOW).is_empty());

        if let Some(pipeline) = pipeline.filter(|_| has_window) {
            let results = pipeline
                .execute_window(RETRIEVAL_WINDOW, &mut ctx.technique_context)
                .await;
            if results.iter().all(|r| !r.success) {
                let message = results
                    .iter()
                    .find_map(|r| r.error.clone())
                    .unwrap_or_else(|| "all retrieval techniques failed".to_string());
                return Err(StageError::Retrieval(RetrievalError::Backend { message }));
            }
        } else {
            let query = ctx.technique_context.current_query.clone();
            let results = ctx
                .technique_context
                .retrieve(&query, self.config.default_top_k)
                .await?;
            ctx.technique_context.retrieved_documents = results;
        }

        ctx.query_results = ctx.technique_context.retrieved_documents.clone();
        Ok(StageStatus::Completed)
    }
}
