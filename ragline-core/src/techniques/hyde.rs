//! Hypothetical document embeddings.
//!
//! Instead of embedding the question, HyDE asks the model to draft the
//! passage that would answer it and retrieves against that draft. The
//! draft never reaches the user; it only steers the vector search.

use async_trait::async_trait;
use serde_json::json;

use crate::context::TechniqueContext;
use crate::error::TechniqueError;
use crate::registry::{Technique, TechniqueMetadata, TechniqueOutput, TechniqueStage};
use crate::techniques::ids;

pub struct Hyde {
    metadata: TechniqueMetadata,
}

impl Hyde {
    pub fn new() -> Self {
        Self {
            metadata: TechniqueMetadata {
                id: ids::HYDE.to_string(),
                stage: TechniqueStage::QueryTransform,
                requires_llm: true,
                requires_embeddings: false,
                estimated_latency_ms: 600,
                token_cost_multiplier: 1.5,
            },
        }
    }
}

impl Default for Hyde {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Technique for Hyde {
    fn metadata(&self) -> &TechniqueMetadata {
        &self.metadata
    }

    async fn execute(&self, ctx: &mut TechniqueContext) -> Result<TechniqueOutput, TechniqueError> {
        let question = ctx.current_query.clone();
        let max_tokens = ctx.config_u64("max_tokens").unwrap_or(256) as u32;
        let prompt = format!(
            "Write a short factual passage that would answer the question, \
             as if excerpted from a technical document. Do not address the \
             reader and do not mention the question.\n\nQuestion: {question}\n\nPassage:"
        );

        let generation = ctx
            .generate(&prompt, max_tokens, 0.7)
            .await
            .map_err(|e| TechniqueError::failed(ids::HYDE, e))?;
        let passage = generation.text.trim().to_string();
        if passage.is_empty() {
            return Err(TechniqueError::failed(
                ids::HYDE,
                "model returned an empty passage",
            ));
        }

        ctx.current_query = passage.clone();
        Ok(TechniqueOutput::new(json!({
            "question": question,
            "hypothetical_document": passage,
        })))
    }
}
