//! Question classification: does this need decomposed reasoning?

use async_trait::async_trait;

use crate::context::TechniqueContext;
use crate::error::GenerationError;

#[async_trait]
pub trait QuestionClassifier: Send + Sync {
    async fn requires_reasoning(
        &self,
        ctx: &mut TechniqueContext,
        question: &str,
    ) -> Result<bool, GenerationError>;
}

const COMPARATIVE_MARKERS: &[&str] = &[" vs ", " versus ", " compared to ", " difference between "];

/// Surface-form classifier. Errs toward plain generation: reasoning only
/// fires on comparative, causal, multi-question, or long compound forms.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self
    }

    fn classify(question: &str) -> bool {
        let lower = question.to_lowercase();
        if COMPARATIVE_MARKERS.iter().any(|m| lower.contains(m)) {
            return true;
        }
        if lower.matches('?').count() > 1 {
            return true;
        }
        if lower.starts_with("why ") || lower.contains(" why ") {
            return true;
        }
        if lower.contains("how does") || lower.contains("how do ") || lower.contains("explain") {
            return true;
        }
        let words = question.split_whitespace().count();
        if words > 25 {
            return true;
        }
        // Conjunctions only count in questions long enough to be compound.
        lower.contains(" and ") && words > 12
    }
}

#[async_trait]
impl QuestionClassifier for HeuristicClassifier {
    async fn requires_reasoning(
        &self,
        _ctx: &mut TechniqueContext,
        question: &str,
    ) -> Result<bool, GenerationError> {
        Ok(Self::classify(question))
    }
}

/// Classifier that defers the call to the model. One short completion
/// per request; parse failures surface as errors rather than guesses.
#[derive(Debug, Default, Clone, Copy)]
pub struct LlmClassifier;

impl LlmClassifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QuestionClassifier for LlmClassifier {
    async fn requires_reasoning(
        &self,
        ctx: &mut TechniqueContext,
        question: &str,
    ) -> Result<bool, GenerationError> {
        let prompt = format!(
            "Does answering this question require comparing multiple items \
             or reasoning over several sub-questions? Reply yes or no.\n\n\
             Question: {question}"
        );
        let generation = ctx.generate(&prompt, 8, 0.0).await?;
        let text = generation.text.trim().to_lowercase();
        if text.starts_with("yes") {
            Ok(true)
        } else if text.starts_with("no") {
            Ok(false)
        } else {
            Err(GenerationError::ResponseParse {
                message: format!("expected yes or no, got {text:?}"),
            })
        }
    }
}
