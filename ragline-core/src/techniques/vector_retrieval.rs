//! Dense vector search over the resolved collection.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::TechniqueContext;
use crate::error::TechniqueError;
use crate::registry::{Technique, TechniqueMetadata, TechniqueOutput, TechniqueStage};
use crate::techniques::{ids, validate_top_k};

pub struct VectorRetrieval {
    metadata: TechniqueMetadata,
}

impl VectorRetrieval {
    pub fn new() -> Self {
        Self {
            metadata: TechniqueMetadata {
                id: ids::VECTOR_RETRIEVAL.to_string(),
                stage: TechniqueStage::Retrieval,
                requires_llm: false,
                requires_embeddings: true,
                estimated_latency_ms: 120,
                token_cost_multiplier: 0.0,
            },
        }
    }
}

impl Default for VectorRetrieval {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Technique for VectorRetrieval {
    fn metadata(&self) -> &TechniqueMetadata {
        &self.metadata
    }

    fn validate_config(&self, config: &HashMap<String, Value>) -> Result<(), TechniqueError> {
        validate_top_k(ids::VECTOR_RETRIEVAL, config)
    }

    async fn execute(&self, ctx: &mut TechniqueContext) -> Result<TechniqueOutput, TechniqueError> {
        let top_k = ctx.config_usize("top_k").unwrap_or(10);
        let query = ctx.current_query.clone();
        let results = ctx
            .retrieve(&query, top_k)
            .await
            .map_err(|e| TechniqueError::failed(ids::VECTOR_RETRIEVAL, e))?;
        let count = results.len();
        ctx.retrieved_documents = results;
        Ok(TechniqueOutput::new(json!({
            "count": count,
            "top_k": top_k,
        })))
    }
}
