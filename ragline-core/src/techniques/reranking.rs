//! Cross-encoder reordering of retrieved chunks.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::context::TechniqueContext;
use crate::error::TechniqueError;
use crate::registry::{Technique, TechniqueMetadata, TechniqueOutput, TechniqueStage};
use crate::techniques::{ids, validate_top_k};

pub struct Reranking {
    metadata: TechniqueMetadata,
}

impl Reranking {
    pub fn new() -> Self {
        Self {
            metadata: TechniqueMetadata {
                id: ids::RERANKING.to_string(),
                stage: TechniqueStage::Reranking,
                requires_llm: false,
                requires_embeddings: false,
                estimated_latency_ms: 300,
                token_cost_multiplier: 0.0,
            },
        }
    }
}

impl Default for Reranking {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Technique for Reranking {
    fn metadata(&self) -> &TechniqueMetadata {
        &self.metadata
    }

    fn validate_config(&self, config: &HashMap<String, Value>) -> Result<(), TechniqueError> {
        validate_top_k(ids::RERANKING, config)
    }

    async fn execute(&self, ctx: &mut TechniqueContext) -> Result<TechniqueOutput, TechniqueError> {
        if ctx.retrieved_documents.is_empty() {
            return Ok(TechniqueOutput::new(json!({
                "count": 0,
                "skipped": true,
            })));
        }

        let top_k = ctx.config_usize("top_k").unwrap_or(10);
        // Relevance is judged against the user's question, not a rewrite.
        let query = ctx.identity().original_query.clone();
        let documents = ctx.retrieved_documents.clone();

        match ctx.rerank(&query, documents, top_k).await {
            Ok(reranked) => {
                let count = reranked.len();
                ctx.retrieved_documents = reranked;
                Ok(TechniqueOutput::new(json!({
                    "count": count,
                    "top_k": top_k,
                })))
            }
            Err(e) => {
                warn!(error = %e, "reranker unavailable, keeping retrieval order");
                Ok(TechniqueOutput::fallback(
                    json!({
                        "count": ctx.retrieved_documents.len(),
                        "top_k": top_k,
                    }),
                    format!("reranker unavailable: {e}"),
                ))
            }
        }
    }
}
