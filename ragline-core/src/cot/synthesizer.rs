//! Final answer synthesis from reasoning steps.

use tracing::warn;

use crate::context::TechniqueContext;
use crate::cot::{ChainOfThoughtOutput, ReasoningStep};
use crate::error::GenerationError;

/// Folds scored reasoning steps into one answer. Synthesis prefers a
/// model pass over the steps; if that fails, the step texts are joined
/// verbatim so the pipeline still returns something grounded.
pub struct AnswerSynthesizer {
    max_tokens: u32,
}

impl AnswerSynthesizer {
    pub fn new() -> Self {
        Self { max_tokens: 1024 }
    }
}

impl Default for AnswerSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean of the step scores, weighted by reasoning length so one-line
/// failures do not drag down a substantial chain. Falls back to a plain
/// mean when every step is empty.
fn aggregate_score(steps: &[ReasoningStep]) -> f64 {
    if steps.is_empty() {
        return 0.0;
    }
    let total_len: f64 = steps.iter().map(|s| s.reasoning_text.len() as f64).sum();
    if total_len == 0.0 {
        return steps.iter().map(|s| s.quality_score).sum::<f64>() / steps.len() as f64;
    }
    steps
        .iter()
        .map(|s| s.quality_score * s.reasoning_text.len() as f64)
        .sum::<f64>()
        / total_len
}

impl AnswerSynthesizer {
    pub async fn synthesize(
        &self,
        ctx: &mut TechniqueContext,
        question: &str,
        steps: Vec<ReasoningStep>,
    ) -> ChainOfThoughtOutput {
        let quality_score = aggregate_score(&steps);
        let final_answer = match self.llm_synthesis(ctx, question, &steps).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "synthesis failed, joining step reasoning verbatim");
                let texts: Vec<&str> = steps
                    .iter()
                    .map(|s| s.reasoning_text.as_str())
                    .filter(|t| !t.is_empty())
                    .collect();
                if texts.is_empty() {
                    "Unable to produce grounded reasoning for this question.".to_string()
                } else {
                    texts.join("\n\n")
                }
            }
        };
        ChainOfThoughtOutput {
            reasoning_steps: steps,
            final_answer,
            quality_score,
        }
    }

    async fn llm_synthesis(
        &self,
        ctx: &mut TechniqueContext,
        question: &str,
        steps: &[ReasoningStep],
    ) -> Result<String, GenerationError> {
        let mut prompt = String::from(
            "Combine the reasoning steps into one coherent answer. Do not \
             introduce claims absent from the steps.\n\n",
        );
        for (i, step) in steps.iter().enumerate() {
            prompt.push_str(&format!(
                "Step {}: {}\n{}\n\n",
                i + 1,
                step.sub_question,
                step.reasoning_text
            ));
        }
        prompt.push_str(&format!("Question: {question}\nAnswer:"));

        let generation = ctx.generate(&prompt, self.max_tokens, 0.3).await?;
        let answer = generation.text.trim().to_string();
        if answer.is_empty() {
            return Err(GenerationError::EmptyCompletion);
        }
        Ok(answer)
    }
}
