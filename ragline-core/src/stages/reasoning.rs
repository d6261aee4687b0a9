//! Stage 5: conditional chain-of-thought reasoning.

use async_trait::async_trait;

use crate::context::SearchContext;
use crate::cot::ChainOfThoughtService;
use crate::error::StageError;
use crate::stages::{Stage, StageStatus};

pub struct ReasoningStage {
    service: ChainOfThoughtService,
}

impl ReasoningStage {
    pub fn new(service: ChainOfThoughtService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Stage for ReasoningStage {
    fn name(&self) -> &'static str {
        "reasoning"
    }

    async fn run(&self, ctx: &mut SearchContext) -> Result<StageStatus, StageError> {
        let question = ctx.technique_context.identity().original_query.clone();
        let required = self
            .service
            .requires_reasoning(&mut ctx.technique_context, &question)
            .await
            .map_err(|e| StageError::Reasoning {
                message: e.to_string(),
            })?;
        if !required {
            return Ok(StageStatus::Skipped);
        }

        let output = self.service.run(&mut ctx.technique_context, &question).await;
        ctx.cot_output = Some(output);
        Ok(StageStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{MockLlmClient, MockReranker, MockRetriever};
    use crate::config::{CotConfig, EngineConfig};
    use crate::cot::{LlmClassifier, ScriptedQualityScorer};
    use crate::error::GenerationError;
    use crate::types::SearchRequest;
    use std::sync::Arc;
    use uuid::Uuid;

    fn context_for(question: &str, llm: Arc<MockLlmClient>) -> SearchContext {
        let request = SearchRequest::new(question, Uuid::new_v4(), Uuid::new_v4());
        let mut ctx = SearchContext::new(
            &request,
            llm,
            Arc::new(MockRetriever::new()),
            Arc::new(MockReranker::new()),
            &EngineConfig::default(),
        );
        ctx.technique_context.resolve_collection("docs");
        ctx
    }

    fn service_with_scores(scores: Vec<f64>) -> ChainOfThoughtService {
        ChainOfThoughtService::new(CotConfig::default())
            .with_scorer(Arc::new(ScriptedQualityScorer::new(scores)))
    }

    #[tokio::test]
    async fn test_simple_question_skips_reasoning() {
        let llm = Arc::new(MockLlmClient::new());
        let mut ctx = context_for("What is the default chunk size?", llm.clone());

        let status = ReasoningStage::new(service_with_scores(vec![]))
            .run(&mut ctx)
            .await
            .unwrap();

        assert_eq!(status, StageStatus::Skipped);
        assert!(ctx.cot_output.is_none());
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_comparative_question_produces_cot_output() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_text("1. What does HNSW optimize?\n2. What does IVF optimize?");
        let mut ctx = context_for(
            "What is the difference between HNSW and IVF?",
            llm,
        );

        let status = ReasoningStage::new(service_with_scores(vec![0.9, 0.8]))
            .run(&mut ctx)
            .await
            .unwrap();

        assert_eq!(status, StageStatus::Completed);
        let cot = ctx.cot_output.as_ref().unwrap();
        assert_eq!(cot.reasoning_steps.len(), 2);
    }

    #[tokio::test]
    async fn test_classifier_failure_is_non_fatal() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_error(GenerationError::ApiRequest {
            message: "rate limited".into(),
        });
        let mut ctx = context_for("What is the default chunk size?", llm);

        let service = ChainOfThoughtService::new(CotConfig::default())
            .with_classifier(Arc::new(LlmClassifier::new()));
        let err = ReasoningStage::new(service).run(&mut ctx).await.unwrap_err();

        assert!(matches!(err, StageError::Reasoning { .. }));
        assert!(!err.is_fatal());
    }
}
