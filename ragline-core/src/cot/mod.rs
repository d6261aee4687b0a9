//! Chain-of-thought reasoning for multi-part questions.
//!
//! The service classifies the question, decomposes it into sub-questions,
//! reasons over each with its own retrieval pass, scores every step, and
//! synthesizes a final answer. Classification and scoring are pluggable;
//! the defaults are heuristic and make no model calls of their own.

use serde::{Deserialize, Serialize};

pub mod classifier;
pub mod decomposer;
pub mod scoring;
pub mod service;
pub mod synthesizer;

pub use classifier::{HeuristicClassifier, LlmClassifier, QuestionClassifier};
pub use decomposer::QuestionDecomposer;
pub use scoring::{
    HeuristicQualityScorer, LlmQualityScorer, QualityScorer, ScoreInput, ScriptedQualityScorer,
};
pub use service::ChainOfThoughtService;
pub use synthesizer::AnswerSynthesizer;

/// One reasoned sub-question, with the evidence and score behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub sub_question: String,
    pub retrieved_context: String,
    pub reasoning_text: String,
    pub quality_score: f64,
    /// Attempts beyond the first that this step needed.
    pub retry_count: u32,
}

/// The full reasoning trace attached to a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainOfThoughtOutput {
    pub reasoning_steps: Vec<ReasoningStep>,
    pub final_answer: String,
    /// Length-weighted mean of the step scores.
    pub quality_score: f64,
}
