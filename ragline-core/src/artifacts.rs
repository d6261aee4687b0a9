//! Response-stage artifact generation.
//!
//! Artifacts are derived views of a finished response: citation lists,
//! export formats, audit summaries. Every generator is a pure function
//! of the [`SearchResponse`], with no ordering dependency between
//! generators, so they fan out concurrently. This is the one place in
//! the crate where work runs in parallel; the pipeline itself is
//! strictly sequential because each stage reads the previous stage's
//! mutations.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::types::SearchResponse;

/// A named artifact derived from a finished response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerArtifact {
    pub name: String,
    pub content: Value,
}

/// Failure of one artifact generator. Never aborts the response; the
/// artifact is simply absent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Artifact generation failed: {message}")]
pub struct ArtifactError {
    pub message: String,
}

impl ArtifactError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An independent post-response generator. Implementations must not
/// mutate shared state; they only read the response.
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, response: &SearchResponse) -> Result<AnswerArtifact, ArtifactError>;
}

/// Run every generator against the response concurrently. Output order
/// follows generator order; a failed generator is logged and skipped.
pub async fn generate_artifacts(
    generators: &[Arc<dyn ArtifactGenerator>],
    response: &SearchResponse,
) -> Vec<AnswerArtifact> {
    let pending = generators
        .iter()
        .map(|g| async move { (g.name().to_string(), g.generate(response).await) });

    let mut artifacts = Vec::with_capacity(generators.len());
    for (name, result) in join_all(pending).await {
        match result {
            Ok(artifact) => artifacts.push(artifact),
            Err(e) => warn!(generator = %name, error = %e, "artifact generator failed, skipping"),
        }
    }
    artifacts
}

/// Rolls the response's document metadata into a citation list.
#[derive(Debug, Default, Clone, Copy)]
pub struct CitationsGenerator;

impl CitationsGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArtifactGenerator for CitationsGenerator {
    fn name(&self) -> &str {
        "citations"
    }

    async fn generate(&self, response: &SearchResponse) -> Result<AnswerArtifact, ArtifactError> {
        let citations: Vec<Value> = response
            .documents
            .iter()
            .map(|d| {
                serde_json::json!({
                    "document_id": d.document_id,
                    "source": d.source,
                    "chunk_count": d.chunk_count,
                    "top_score": d.top_score,
                })
            })
            .collect();
        Ok(AnswerArtifact {
            name: self.name().to_string(),
            content: Value::Array(citations),
        })
    }
}
