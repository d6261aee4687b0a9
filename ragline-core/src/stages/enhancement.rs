//! Stage 2: query enhancement.
//!
//! Runs the Preprocessing/QueryTransform window of the technique
//! pipeline. When the plan carries no such techniques, a single direct
//! LLM rewrite stands in (disable via `enhancement.direct_rewrite`).
//! Short queries skip the stage; there is nothing to enhance.

use async_trait::async_trait;

use crate::config::EnhancementConfig;
use crate::context::SearchContext;
use crate::error::StageError;
use crate::stages::{Stage, StageStatus, QUERY_ENHANCEMENT_WINDOW};

pub struct QueryEnhancementStage {
    config: EnhancementConfig,
}

impl QueryEnhancementStage {
    pub fn new(config: EnhancementConfig) -> Self {
        Self { config }
    }

    async fn direct_rewrite(&self, ctx: &mut SearchContext) -> Result<(), StageError> {
        let question = ctx.technique_context.current_query.clone();
        let prompt = format!(
            "Rewrite the question as a focused search query. \
             Reply with the query only.\n\nQuestion: {question}"
        );
        let generation = ctx
            .technique_context
            .generate(&prompt, 128, 0.3)
            .await
            .map_err(|e| StageError::Enhancement {
                message: e.to_string(),
            })?;
        let rewritten = generation.text.trim().trim_matches('"').to_string();
        if rewritten.is_empty() {
            return Err(StageError::Enhancement {
                message: "model returned an empty rewrite".to_string(),
            });
        }
        ctx.technique_context.current_query = rewritten;
        Ok(())
    }
}

#[async_trait]
impl Stage for QueryEnhancementStage {
    fn name(&self) -> &'static str {
        "query_enhancement"
    }

    async fn run(&self, ctx: &mut SearchContext) -> Result<StageStatus, StageError> {
        let original = ctx.technique_context.identity().original_query.clone();
        if original.split_whitespace().count() < self.config.min_query_words {
            return Ok(StageStatus::Skipped);
        }

        let pipeline = ctx.pipeline.clone();
        let window_techniques = pipeline
            .as_ref()
            .map(|p| p.ids_in_window(QUERY_ENHANCEMENT_WINDOW))
            .unwrap_or_default();

        let status = if let Some(pipeline) = pipeline.filter(|_| !window_techniques.is_empty()) {
            pipeline
                .execute_window(QUERY_ENHANCEMENT_WINDOW, &mut ctx.technique_context)
                .await;
            StageStatus::Completed
        } else if self.config.direct_rewrite {
            self.direct_rewrite(ctx).await?;
            StageStatus::Completed
        } else {
            StageStatus::Skipped
        };

        if ctx.technique_context.current_query != original {
            ctx.rewritten_query = Some(ctx.technique_context.current_query.clone());
        }
        Ok(status)
    }
}
