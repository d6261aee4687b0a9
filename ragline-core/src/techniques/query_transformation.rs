//! LLM-based query rewriting.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::TechniqueContext;
use crate::error::TechniqueError;
use crate::registry::{Technique, TechniqueMetadata, TechniqueOutput, TechniqueStage};
use crate::techniques::ids;

pub struct QueryTransformation {
    metadata: TechniqueMetadata,
}

impl QueryTransformation {
    pub fn new() -> Self {
        Self {
            metadata: TechniqueMetadata {
                id: ids::QUERY_TRANSFORMATION.to_string(),
                stage: TechniqueStage::QueryTransform,
                requires_llm: true,
                requires_embeddings: false,
                estimated_latency_ms: 400,
                token_cost_multiplier: 1.2,
            },
        }
    }
}

impl Default for QueryTransformation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Technique for QueryTransformation {
    fn metadata(&self) -> &TechniqueMetadata {
        &self.metadata
    }

    fn validate_config(&self, config: &HashMap<String, Value>) -> Result<(), TechniqueError> {
        if let Some(value) = config.get("max_tokens") {
            if !value.as_u64().is_some_and(|v| v > 0) {
                return Err(TechniqueError::InvalidConfig {
                    technique: ids::QUERY_TRANSFORMATION.to_string(),
                    key: "max_tokens".into(),
                    reason: "must be a positive integer".into(),
                });
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: &mut TechniqueContext) -> Result<TechniqueOutput, TechniqueError> {
        let original = ctx.current_query.clone();
        let max_tokens = ctx.config_u64("max_tokens").unwrap_or(128) as u32;
        let prompt = format!(
            "Rewrite the question as a focused search query. \
             Reply with the query only.\n\nQuestion: {original}"
        );

        let generation = ctx
            .generate(&prompt, max_tokens, 0.3)
            .await
            .map_err(|e| TechniqueError::failed(ids::QUERY_TRANSFORMATION, e))?;
        let rewritten = generation.text.trim().trim_matches('"').to_string();
        if rewritten.is_empty() {
            return Err(TechniqueError::failed(
                ids::QUERY_TRANSFORMATION,
                "model returned an empty rewrite",
            ));
        }

        ctx.current_query = rewritten.clone();
        Ok(TechniqueOutput::new(json!({
            "original": original,
            "rewritten": rewritten,
        })))
    }
}
