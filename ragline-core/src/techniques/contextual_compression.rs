//! Sentence-level pruning of retrieved chunks.
//!
//! Drops sentences that share no keywords with the question, shrinking
//! the generation prompt without an extra model call. Chunks of a single
//! sentence pass through untouched.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::TechniqueContext;
use crate::error::TechniqueError;
use crate::registry::{Technique, TechniqueMetadata, TechniqueOutput, TechniqueStage};
use crate::techniques::ids;
use crate::text::{keyword_overlap, split_sentences};

pub struct ContextualCompression {
    metadata: TechniqueMetadata,
}

impl ContextualCompression {
    pub fn new() -> Self {
        Self {
            metadata: TechniqueMetadata {
                id: ids::CONTEXTUAL_COMPRESSION.to_string(),
                stage: TechniqueStage::Compression,
                requires_llm: false,
                requires_embeddings: false,
                estimated_latency_ms: 40,
                token_cost_multiplier: 0.0,
            },
        }
    }
}

impl Default for ContextualCompression {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Technique for ContextualCompression {
    fn metadata(&self) -> &TechniqueMetadata {
        &self.metadata
    }

    fn validate_config(&self, config: &HashMap<String, Value>) -> Result<(), TechniqueError> {
        if let Some(value) = config.get("min_overlap") {
            let valid = value.as_f64().is_some_and(|v| (0.0..1.0).contains(&v));
            if !valid {
                return Err(TechniqueError::InvalidConfig {
                    technique: ids::CONTEXTUAL_COMPRESSION.to_string(),
                    key: "min_overlap".into(),
                    reason: "must be a number in [0, 1)".into(),
                });
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: &mut TechniqueContext) -> Result<TechniqueOutput, TechniqueError> {
        let min_overlap = ctx.config_f64("min_overlap").unwrap_or(0.0);
        // Relevance is judged against the user's question, not a rewrite.
        let query = ctx.identity().original_query.clone();

        let mut dropped = 0usize;
        for result in ctx.retrieved_documents.iter_mut() {
            let sentences = split_sentences(&result.text);
            if sentences.len() <= 1 {
                continue;
            }
            let mut kept: Vec<String> = sentences
                .iter()
                .filter(|s| keyword_overlap(s, &query) > min_overlap)
                .cloned()
                .collect();
            if kept.is_empty() {
                kept.push(sentences[0].clone());
            }
            dropped += sentences.len() - kept.len();
            result.text = kept.join(" ");
        }

        Ok(TechniqueOutput::new(json!({
            "documents": ctx.retrieved_documents.len(),
            "sentences_dropped": dropped,
        })))
    }
}
