//! Reasoning-step quality scoring.
//!
//! Scores live in `[0, 1]`. The default scorer is heuristic: it rewards
//! reasoning that is grounded in the retrieved chunks, specific, and on
//! topic, and penalizes steps that flatly contradict what earlier steps
//! established.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::context::TechniqueContext;
use crate::error::GenerationError;
use crate::text::{has_negation, keyword_coverage, keyword_overlap};

/// Everything a scorer may look at for one reasoning step.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput<'a> {
    pub sub_question: &'a str,
    pub reasoning: &'a str,
    pub retrieved_context: &'a str,
    /// Accepted reasoning from earlier steps, empty for the first.
    pub accumulated_context: &'a str,
}

#[async_trait]
pub trait QualityScorer: Send + Sync {
    async fn score(
        &self,
        ctx: &mut TechniqueContext,
        input: ScoreInput<'_>,
    ) -> Result<f64, GenerationError>;
}

const GROUNDEDNESS_WEIGHT: f64 = 0.5;
const SPECIFICITY_WEIGHT: f64 = 0.3;
const RELEVANCE_WEIGHT: f64 = 0.2;
const CONTRADICTION_PENALTY: f64 = 0.2;
const SPECIFICITY_TARGET_WORDS: f64 = 60.0;

fn heuristic_score(input: &ScoreInput<'_>) -> f64 {
    let groundedness = keyword_coverage(input.reasoning, input.retrieved_context);
    let words = input.reasoning.split_whitespace().count() as f64;
    let specificity = (words / SPECIFICITY_TARGET_WORDS).min(1.0);
    let relevance = keyword_overlap(input.reasoning, input.sub_question);

    let mut score = groundedness * GROUNDEDNESS_WEIGHT
        + specificity * SPECIFICITY_WEIGHT
        + relevance * RELEVANCE_WEIGHT;

    // Same topic as established reasoning but flipped polarity reads as a
    // contradiction.
    if !input.accumulated_context.is_empty()
        && has_negation(input.reasoning) != has_negation(input.accumulated_context)
        && keyword_overlap(input.reasoning, input.accumulated_context) > 0.4
    {
        score -= CONTRADICTION_PENALTY;
    }

    score.clamp(0.0, 1.0)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicQualityScorer;

impl HeuristicQualityScorer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QualityScorer for HeuristicQualityScorer {
    async fn score(
        &self,
        _ctx: &mut TechniqueContext,
        input: ScoreInput<'_>,
    ) -> Result<f64, GenerationError> {
        Ok(heuristic_score(&input))
    }
}

/// Scorer that asks the model for a 0-10 grade. Accepts bare numbers and
/// `n/10` forms; anything else is a parse error.
#[derive(Debug, Default, Clone, Copy)]
pub struct LlmQualityScorer;

impl LlmQualityScorer {
    pub fn new() -> Self {
        Self
    }
}

fn parse_grade(text: &str) -> Option<f64> {
    let text = text.trim();
    let numeric = text.split('/').next()?.trim();
    let grade: f64 = numeric.parse().ok()?;
    Some((grade / 10.0).clamp(0.0, 1.0))
}

#[async_trait]
impl QualityScorer for LlmQualityScorer {
    async fn score(
        &self,
        ctx: &mut TechniqueContext,
        input: ScoreInput<'_>,
    ) -> Result<f64, GenerationError> {
        let prompt = format!(
            "Grade how well the reasoning answers the sub-question using only \
             the sources, from 0 (ungrounded) to 10 (fully grounded). Reply \
             with the number only.\n\nSub-question: {}\n\nSources:\n{}\n\n\
             Reasoning:\n{}",
            input.sub_question, input.retrieved_context, input.reasoning
        );
        let generation = ctx.generate(&prompt, 8, 0.0).await?;
        parse_grade(&generation.text).ok_or_else(|| GenerationError::ResponseParse {
            message: format!("expected a 0-10 grade, got {:?}", generation.text.trim()),
        })
    }
}

/// Deterministic scorer for tests: returns queued scores in order, then
/// 0.0 once drained.
#[derive(Debug, Default)]
pub struct ScriptedQualityScorer {
    scores: Mutex<Vec<f64>>,
}

impl ScriptedQualityScorer {
    pub fn new(scores: Vec<f64>) -> Self {
        Self {
            scores: Mutex::new(scores),
        }
    }
}

#[async_trait]
impl QualityScorer for ScriptedQualityScorer {
    async fn score(
        &self,
        _ctx: &mut TechniqueContext,
        _input: ScoreInput<'_>,
    ) -> Result<f64, GenerationError> {
        let mut scores = self.scores.lock().unwrap();
        if scores.is_empty() {
            Ok(0.0)
        } else {
            Ok(scores.remove(0))
        }
    }
}
