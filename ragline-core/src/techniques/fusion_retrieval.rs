//! Multi-pass retrieval fused with reciprocal rank scoring.
//!
//! Runs the query twice against the vector store, once verbatim and once
//! reduced to its keywords, then merges the passes so chunks surfaced by
//! both land on top. Scores follow reciprocal rank fusion: each pass
//! contributes `1 / (K + rank + 1)` for every chunk it returned.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::context::TechniqueContext;
use crate::error::TechniqueError;
use crate::registry::{Technique, TechniqueMetadata, TechniqueOutput, TechniqueStage};
use crate::techniques::{ids, validate_top_k};
use crate::text::extract_keywords;
use crate::types::QueryResult;

const RRF_K: f64 = 60.0;

pub struct FusionRetrieval {
    metadata: TechniqueMetadata,
}

impl FusionRetrieval {
    pub fn new() -> Self {
        Self {
            metadata: TechniqueMetadata {
                id: ids::FUSION_RETRIEVAL.to_string(),
                stage: TechniqueStage::Retrieval,
                requires_llm: false,
                requires_embeddings: true,
                estimated_latency_ms: 260,
                token_cost_multiplier: 0.0,
            },
        }
    }
}

impl Default for FusionRetrieval {
    fn default() -> Self {
        Self::new()
    }
}

fn fuse(passes: &[Vec<QueryResult>], top_k: usize) -> Vec<QueryResult> {
    let mut fused: Vec<QueryResult> = Vec::new();
    let mut positions: HashMap<(Uuid, usize), usize> = HashMap::new();
    for pass in passes {
        for (rank, result) in pass.iter().enumerate() {
            let contribution = 1.0 / (RRF_K + rank as f64 + 1.0);
            match positions.get(&(result.document_id, result.chunk_index)) {
                Some(&at) => fused[at].score += contribution,
                None => {
                    positions.insert((result.document_id, result.chunk_index), fused.len());
                    let mut entry = result.clone();
                    entry.score = contribution;
                    fused.push(entry);
                }
            }
        }
    }
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(top_k);
    fused
}

#[async_trait]
impl Technique for FusionRetrieval {
    fn metadata(&self) -> &TechniqueMetadata {
        &self.metadata
    }

    fn validate_config(&self, config: &HashMap<String, Value>) -> Result<(), TechniqueError> {
        validate_top_k(ids::FUSION_RETRIEVAL, config)
    }

    async fn execute(&self, ctx: &mut TechniqueContext) -> Result<TechniqueOutput, TechniqueError> {
        let top_k = ctx.config_usize("top_k").unwrap_or(10);
        let query = ctx.current_query.clone();

        let primary = ctx
            .retrieve(&query, top_k)
            .await
            .map_err(|e| TechniqueError::failed(ids::FUSION_RETRIEVAL, e))?;

        let keyword_query = extract_keywords(&query).join(" ");
        let mut passes = vec![primary];
        let mut note = None;
        if !keyword_query.is_empty() && keyword_query != query {
            match ctx.retrieve(&keyword_query, top_k).await {
                Ok(secondary) => passes.push(secondary),
                Err(e) => {
                    debug!(error = %e, "keyword pass failed, fusing primary pass only");
                    note = Some(format!("keyword pass failed: {e}"));
                }
            }
        }

        let pass_count = passes.len();
        let fused = fuse(&passes, top_k);
        let count = fused.len();
        ctx.retrieved_documents = fused;

        let output = json!({
            "count": count,
            "passes": pass_count,
            "top_k": top_k,
        });
        Ok(match note {
            Some(note) => TechniqueOutput::fallback(output, note),
            None => TechniqueOutput::new(output),
        })
    }
}
