//! Stage 6: final answer generation.

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::context::SearchContext;
use crate::error::{GenerationError, StageError};
use crate::stages::{Stage, StageStatus};

pub struct GenerationStage {
    config: GenerationConfig,
}

impl GenerationStage {
    pub fn new(config: GenerationConfig) -> Self {
        Self { config }
    }

    /// Quote the top chunks, the CoT synthesis when present, and the
    /// user's question verbatim. Rewrites steer retrieval only; the
    /// answer is always to the question that was asked.
    fn build_prompt(&self, ctx: &SearchContext) -> String {
        let mut prompt = String::from(
            "Answer the question using only the provided sources. \
             Cite sources as [Source N] where relevant.\n\n",
        );
        if !ctx.query_results.is_empty() {
            prompt.push_str("Sources:\n");
            for (i, result) in ctx
                .query_results
                .iter()
                .take(self.config.max_context_chunks)
                .enumerate()
            {
                prompt.push_str(&format!("[Source {}] {}\n", i + 1, result.text));
            }
            prompt.push('\n');
        }
        if let Some(cot) = &ctx.cot_output {
            prompt.push_str(&format!("Reasoning summary:\n{}\n\n", cot.final_answer));
        }
        prompt.push_str(&format!(
            "Question: {}\nAnswer:",
            ctx.technique_context.identity().original_query
        ));
        prompt
    }
}

#[async_trait]
impl Stage for GenerationStage {
    fn name(&self) -> &'static str {
        "generation"
    }

    async fn run(&self, ctx: &mut SearchContext) -> Result<StageStatus, StageError> {
        let prompt = self.build_prompt(ctx);
        let generation = ctx
            .technique_context
            .generate(&prompt, self.config.max_tokens, self.config.temperature)
            .await?;
        let answer = generation.text.trim();
        if answer.is_empty() {
            return Err(StageError::Generation(GenerationError::EmptyCompletion));
        }
        ctx.generated_answer = Some(answer.to_string());
        Ok(StageStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{MockLlmClient, MockReranker, MockRetriever};
    use crate::config::EngineConfig;
    use crate::cot::ChainOfThoughtOutput;
    use crate::types::{QueryResult, SearchRequest};
    use std::sync::Arc;
    use uuid::Uuid;

    fn context_with(llm: Arc<MockLlmClient>) -> SearchContext {
        let request = SearchRequest::new(
            "What is the capital of France?",
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        SearchContext::new(
            &request,
            llm,
            Arc::new(MockRetriever::new()),
            Arc::new(MockReranker::new()),
            &EngineConfig::default(),
        )
    }

    fn chunk(text: &str, score: f64) -> QueryResult {
        QueryResult::new(Uuid::new_v4(), 0, text, score)
    }

    #[tokio::test]
    async fn test_prompt_quotes_sources_and_question() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_text("Paris is the capital of France. [Source 1]");
        let mut ctx = context_with(llm.clone());
        ctx.query_results = vec![chunk("Paris has been the capital since 508.", 0.9)];
        ctx.technique_context.current_query = "france capital city".to_string();

        let status = GenerationStage::new(GenerationConfig::default())
            .run(&mut ctx)
            .await
            .unwrap();

        assert_eq!(status, StageStatus::Completed);
        assert_eq!(
            ctx.generated_answer.as_deref(),
            Some("Paris is the capital of France. [Source 1]")
        );
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("[Source 1] Paris has been the capital since 508."));
        // The original question, not the rewrite, is answered.
        assert!(prompt.contains("Question: What is the capital of France?"));
        assert!(!prompt.contains("france capital city"));
    }

    #[tokio::test]
    async fn test_prompt_truncates_to_max_context_chunks() {
        let llm = Arc::new(MockLlmClient::new());
        let mut ctx = context_with(llm.clone());
        ctx.query_results = (0..8).map(|i| chunk(&format!("chunk {i}"), 0.5)).collect();

        GenerationStage::new(GenerationConfig {
            max_context_chunks: 3,
            ..GenerationConfig::default()
        })
        .run(&mut ctx)
        .await
        .unwrap();

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("[Source 3] chunk 2"));
        assert!(!prompt.contains("chunk 3"));
    }

    #[tokio::test]
    async fn test_prompt_includes_reasoning_summary() {
        let llm = Arc::new(MockLlmClient::new());
        let mut ctx = context_with(llm.clone());
        ctx.cot_output = Some(ChainOfThoughtOutput {
            reasoning_steps: Vec::new(),
            final_answer: "Paris, by elimination of the alternatives.".to_string(),
            quality_score: 0.8,
        });

        GenerationStage::new(GenerationConfig::default())
            .run(&mut ctx)
            .await
            .unwrap();

        assert!(llm.prompts()[0].contains("Reasoning summary:\nParis, by elimination"));
    }

    #[tokio::test]
    async fn test_empty_completion_is_fatal() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_text("   ");
        let mut ctx = context_with(llm);

        let err = GenerationStage::new(GenerationConfig::default())
            .run(&mut ctx)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StageError::Generation(GenerationError::EmptyCompletion)
        ));
        assert!(err.is_fatal());
        assert!(ctx.generated_answer.is_none());
    }
}
