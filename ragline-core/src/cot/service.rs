//! The reasoning loop: decompose, retrieve, reason, score, retry.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::CotConfig;
use crate::context::TechniqueContext;
use crate::cot::classifier::{HeuristicClassifier, QuestionClassifier};
use crate::cot::decomposer::QuestionDecomposer;
use crate::cot::scoring::{HeuristicQualityScorer, QualityScorer, ScoreInput};
use crate::cot::synthesizer::AnswerSynthesizer;
use crate::cot::{ChainOfThoughtOutput, ReasoningStep};
use crate::error::GenerationError;
use crate::types::QueryResult;

const FAILED_STEP_TEXT: &str = "No grounded reasoning could be produced for this sub-question.";

pub struct ChainOfThoughtService {
    classifier: Arc<dyn QuestionClassifier>,
    decomposer: QuestionDecomposer,
    scorer: Arc<dyn QualityScorer>,
    synthesizer: AnswerSynthesizer,
    config: CotConfig,
}

impl ChainOfThoughtService {
    pub fn new(config: CotConfig) -> Self {
        Self {
            classifier: Arc::new(HeuristicClassifier::new()),
            decomposer: QuestionDecomposer::new(),
            scorer: Arc::new(HeuristicQualityScorer::new()),
            synthesizer: AnswerSynthesizer::new(),
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn QuestionClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn QualityScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub async fn requires_reasoning(
        &self,
        ctx: &mut TechniqueContext,
        question: &str,
    ) -> Result<bool, GenerationError> {
        self.classifier.requires_reasoning(ctx, question).await
    }

    /// Reason over the question end to end. Individual failures degrade;
    /// this always produces an output.
    pub async fn run(&self, ctx: &mut TechniqueContext, question: &str) -> ChainOfThoughtOutput {
        let sub_questions = self
            .decomposer
            .decompose(ctx, question, self.config.max_depth)
            .await;
        debug!(count = sub_questions.len(), "decomposed question");

        let mut steps = Vec::with_capacity(sub_questions.len());
        let mut accumulated = String::new();
        for sub_question in sub_questions {
            let step = self.reason_step(ctx, &sub_question, &accumulated).await;
            if step.quality_score > 0.0 {
                if !accumulated.is_empty() {
                    accumulated.push_str("\n\n");
                }
                accumulated.push_str(&step.reasoning_text);
            }
            steps.push(step);
        }

        self.synthesizer.synthesize(ctx, question, steps).await
    }

    async fn reason_step(
        &self,
        ctx: &mut TechniqueContext,
        sub_question: &str,
        accumulated: &str,
    ) -> ReasoningStep {
        let retrieved_context = match ctx.retrieve(sub_question, self.config.retrieval_top_k).await
        {
            Ok(results) => format_sources(&results),
            Err(e) => {
                warn!(error = %e, sub_question, "sub-question retrieval failed, reasoning without sources");
                String::new()
            }
        };

        let max_attempts = self.config.max_retries + 1;
        let mut best_text = String::new();
        let mut best_score = 0.0f64;
        let mut attempts = 0u32;
        while attempts < max_attempts {
            attempts += 1;
            let (text, score) = self
                .attempt(ctx, sub_question, &retrieved_context, accumulated)
                .await;
            if score > best_score {
                best_score = score;
                best_text = text;
            }
            if best_score >= self.config.quality_threshold {
                break;
            }
        }

        if best_text.is_empty() {
            best_text = FAILED_STEP_TEXT.to_string();
            best_score = 0.0;
        }
        ReasoningStep {
            sub_question: sub_question.to_string(),
            retrieved_context,
            reasoning_text: best_text,
            quality_score: best_score,
            retry_count: attempts - 1,
        }
    }

    async fn attempt(
        &self,
        ctx: &mut TechniqueContext,
        sub_question: &str,
        retrieved_context: &str,
        accumulated: &str,
    ) -> (String, f64) {
        let mut prompt = String::from(
            "Answer the sub-question using only the sources. Be precise; \
             claim nothing the sources do not support.\n\n",
        );
        if !accumulated.is_empty() {
            prompt.push_str(&format!("Established so far:\n{accumulated}\n\n"));
        }
        if !retrieved_context.is_empty() {
            prompt.push_str(&format!("Sources:\n{retrieved_context}\n\n"));
        }
        prompt.push_str(&format!("Sub-question: {sub_question}\nReasoning:"));

        let text = match ctx.generate(&prompt, self.config.step_max_tokens, 0.4).await {
            Ok(generation) => generation.text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "reasoning attempt failed");
                return (String::new(), 0.0);
            }
        };
        if text.is_empty() {
            return (String::new(), 0.0);
        }

        let input = ScoreInput {
            sub_question,
            reasoning: &text,
            retrieved_context,
            accumulated_context: accumulated,
        };
        match self.scorer.score(ctx, input).await {
            Ok(score) => (text, score.clamp(0.0, 1.0)),
            Err(e) => {
                warn!(error = %e, "quality scoring failed, treating attempt as ungrounded");
                (text, 0.0)
            }
        }
    }
}

fn format_sources(results: &[QueryResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[Source {}] {}", i + 1, r.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{MockLlmClient, MockReranker, MockRetriever};
    use crate::config::TimeoutConfig;
    use crate::cot::scoring::ScriptedQualityScorer;
    use std::sync::Arc;
    use uuid::Uuid;

    fn context_with(
        llm: Arc<MockLlmClient>,
        retriever: Arc<MockRetriever>,
    ) -> TechniqueContext {
        let mut ctx = TechniqueContext::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "How do HNSW and IVF differ?",
            llm,
            retriever,
            Arc::new(MockReranker::new()),
            TimeoutConfig::default(),
        );
        ctx.resolve_collection("docs");
        ctx
    }

    fn service_with_scores(scores: Vec<f64>) -> ChainOfThoughtService {
        ChainOfThoughtService::new(CotConfig::default())
            .with_scorer(Arc::new(ScriptedQualityScorer::new(scores)))
    }

    #[tokio::test]
    async fn test_accepts_first_attempt_over_threshold() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_text("1. What structure does HNSW use?");
        llm.queue_text("HNSW builds layered graphs.");
        let retriever = Arc::new(MockRetriever::with_documents(vec![QueryResult::new(
            Uuid::new_v4(),
            0,
            "HNSW builds layered proximity graphs.",
            0.9,
        )]));
        let mut ctx = context_with(llm, retriever);

        let output = service_with_scores(vec![0.9])
            .run(&mut ctx, "How do HNSW and IVF differ?")
            .await;

        assert_eq!(output.reasoning_steps.len(), 1);
        let step = &output.reasoning_steps[0];
        assert_eq!(step.reasoning_text, "HNSW builds layered graphs.");
        assert_eq!(step.quality_score, 0.9);
        assert_eq!(step.retry_count, 0);
        assert!(step.retrieved_context.contains("[Source 1]"));
    }

    #[tokio::test]
    async fn test_retries_until_budget_and_keeps_best() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_text("1. Only sub-question");
        let mut ctx = context_with(llm, Arc::new(MockRetriever::new()));

        let output = service_with_scores(vec![0.2, 0.4, 0.5, 0.55])
            .run(&mut ctx, "Why is recall low?")
            .await;

        let step = &output.reasoning_steps[0];
        assert_eq!(step.retry_count, 3);
        assert_eq!(step.quality_score, 0.55);
    }

    #[tokio::test]
    async fn test_later_steps_see_established_reasoning() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_text("1. First sub\n2. Second sub");
        llm.queue_text("Graphs trade memory for recall.");
        llm.queue_text("Clusters trade recall for memory.");
        let mut ctx = context_with(llm.clone(), Arc::new(MockRetriever::new()));

        service_with_scores(vec![0.9, 0.8])
            .run(&mut ctx, "How do HNSW and IVF differ?")
            .await;

        let prompts = llm.prompts();
        assert!(!prompts[1].contains("Established so far:"));
        assert!(prompts[2].contains("Established so far:"));
        assert!(prompts[2].contains("Graphs trade memory for recall."));
    }

    #[tokio::test]
    async fn test_failed_retrieval_reasons_without_sources() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_text("1. Only sub-question");
        llm.queue_text("Reasoned from prior knowledge.");
        let mut ctx = context_with(llm.clone(), Arc::new(MockRetriever::failing("store offline")));

        let output = service_with_scores(vec![0.9])
            .run(&mut ctx, "Why is recall low?")
            .await;

        assert_eq!(output.reasoning_steps[0].retrieved_context, "");
        assert!(!llm.prompts()[1].contains("Sources:"));
    }

    #[tokio::test]
    async fn test_all_attempts_failing_yields_placeholder_step() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_text("1. Only sub-question");
        for _ in 0..4 {
            llm.queue_error(GenerationError::ApiRequest {
                message: "overloaded".into(),
            });
        }
        let mut ctx = context_with(llm, Arc::new(MockRetriever::new()));

        let output = service_with_scores(vec![0.9])
            .run(&mut ctx, "Why is recall low?")
            .await;

        let step = &output.reasoning_steps[0];
        assert_eq!(step.reasoning_text, FAILED_STEP_TEXT);
        assert_eq!(step.quality_score, 0.0);
        assert_eq!(step.retry_count, 3);
        assert_eq!(output.quality_score, 0.0);
    }

    #[tokio::test]
    async fn test_zero_scored_steps_are_not_accumulated() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_text("1. First sub\n2. Second sub");
        let mut ctx = context_with(llm.clone(), Arc::new(MockRetriever::new()));

        // First step exhausts its attempts at score 0; second succeeds.
        service_with_scores(vec![0.0, 0.0, 0.0, 0.0, 0.9])
            .run(&mut ctx, "How do HNSW and IVF differ?")
            .await;

        let prompts = llm.prompts();
        // Four attempts for step one, so step two's prompt is the sixth call.
        assert!(!prompts[5].contains("Established so far:"));
    }
}
