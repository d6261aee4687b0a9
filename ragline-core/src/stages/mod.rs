//! The fixed six-stage macro pipeline.
//!
//! Stage order never changes: Resolution, Query Enhancement, Retrieval,
//! Reranking, Reasoning, Generation. Resolution, Retrieval, and
//! Generation failures abort the request; the other three degrade into
//! `context.errors` and execution continues. The technique pipeline runs
//! inside the three middle stages, each stage executing the window of
//! techniques whose declared [`TechniqueStage`] belongs to it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::builder::TechniquePipelineBuilder;
use crate::collab::PipelineResolver;
use crate::config::EngineConfig;
use crate::context::SearchContext;
use crate::cot::ChainOfThoughtService;
use crate::error::{PipelineError, StageError};
use crate::registry::{TechniqueRegistry, TechniqueStage};

pub mod enhancement;
pub mod generation;
pub mod reasoning;
pub mod reranking;
pub mod resolution;
pub mod retrieval;

pub use enhancement::QueryEnhancementStage;
pub use generation::GenerationStage;
pub use reasoning::ReasoningStage;
pub use reranking::RerankingStage;
pub use resolution::ResolutionStage;
pub use retrieval::RetrievalStage;

/// Technique stages executed by the Query Enhancement macro stage.
pub const QUERY_ENHANCEMENT_WINDOW: &[TechniqueStage] =
    &[TechniqueStage::Preprocessing, TechniqueStage::QueryTransform];
/// Technique stages executed by the Retrieval macro stage.
pub const RETRIEVAL_WINDOW: &[TechniqueStage] =
    &[TechniqueStage::Retrieval, TechniqueStage::PostRetrieval];
/// Technique stages executed by the Reranking macro stage.
pub const RERANKING_WINDOW: &[TechniqueStage] =
    &[TechniqueStage::Reranking, TechniqueStage::Compression];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Completed,
    Skipped,
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, ctx: &mut SearchContext) -> Result<StageStatus, StageError>;
}

/// Drives one request through the six stages.
pub struct PipelineExecutor {
    registry: Arc<TechniqueRegistry>,
    config: Arc<EngineConfig>,
    resolution: ResolutionStage,
    enhancement: QueryEnhancementStage,
    retrieval: RetrievalStage,
    reranking: RerankingStage,
    reasoning: ReasoningStage,
    generation: GenerationStage,
}

impl PipelineExecutor {
    pub fn new(
        registry: Arc<TechniqueRegistry>,
        resolver: Arc<dyn PipelineResolver>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let service = ChainOfThoughtService::new(config.cot.clone());
        Self::with_reasoning_service(registry, resolver, config, service)
    }

    /// Build an executor around a customized [`ChainOfThoughtService`]
    /// (alternate classifier or scorer).
    pub fn with_reasoning_service(
        registry: Arc<TechniqueRegistry>,
        resolver: Arc<dyn PipelineResolver>,
        config: Arc<EngineConfig>,
        service: ChainOfThoughtService,
    ) -> Self {
        Self {
            resolution: ResolutionStage::new(resolver, config.timeouts),
            enhancement: QueryEnhancementStage::new(config.enhancement.clone()),
            retrieval: RetrievalStage::new(config.retrieval.clone()),
            reranking: RerankingStage::new(),
            reasoning: ReasoningStage::new(service),
            generation: GenerationStage::new(config.generation.clone()),
            registry,
            config,
        }
    }

    /// Run the full pipeline, mutating `ctx` in place. A fatal error
    /// leaves the partially-filled context behind for diagnostics.
    pub async fn execute(&self, ctx: &mut SearchContext) -> Result<(), PipelineError> {
        self.run_stage(&self.resolution, ctx).await?;
        self.build_pipeline(ctx)?;
        self.run_stage(&self.enhancement, ctx).await?;
        self.run_stage(&self.retrieval, ctx).await?;
        self.run_stage(&self.reranking, ctx).await?;
        self.run_stage(&self.reasoning, ctx).await?;
        self.run_stage(&self.generation, ctx).await?;
        Ok(())
    }

    async fn run_stage(
        &self,
        stage: &dyn Stage,
        ctx: &mut SearchContext,
    ) -> Result<(), PipelineError> {
        match stage.run(ctx).await {
            Ok(status) => {
                debug!(stage = stage.name(), ?status, "stage finished");
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                warn!(stage = stage.name(), error = %e, "stage failed, continuing");
                ctx.errors.push(format!("{} stage failed: {e}", stage.name()));
                Ok(())
            }
        }
    }

    /// Build the technique pipeline from the resolved plan and apply the
    /// cost budget. Runs between Resolution and Query Enhancement, so a
    /// rejected request has made no retrieval or LLM call yet.
    fn build_pipeline(&self, ctx: &mut SearchContext) -> Result<(), PipelineError> {
        let pipeline =
            TechniquePipelineBuilder::from_plan(self.registry.clone(), ctx.plan.clone()).build()?;

        let estimate = pipeline.estimated_cost();
        let budget = &self.config.budget;
        if budget.max_estimated_latency_ms > 0
            && estimate.estimated_latency_ms > budget.max_estimated_latency_ms
        {
            return Err(PipelineError::BudgetExceeded {
                reason: format!(
                    "estimated latency {}ms exceeds budget {}ms",
                    estimate.estimated_latency_ms, budget.max_estimated_latency_ms
                ),
            });
        }
        if budget.max_token_multiplier > 0.0
            && estimate.token_cost_multiplier > budget.max_token_multiplier
        {
            return Err(PipelineError::BudgetExceeded {
                reason: format!(
                    "token cost multiplier {:.1} exceeds budget {:.1}",
                    estimate.token_cost_multiplier, budget.max_token_multiplier
                ),
            });
        }

        debug!(
            techniques = ?pipeline.technique_ids(),
            estimated_latency_ms = estimate.estimated_latency_ms,
            "technique pipeline built"
        );
        ctx.pipeline = Some(Arc::new(pipeline));
        Ok(())
    }
}
