//! Fundamental types shared across the pipeline: request/response schema,
//! retrieval results, technique configuration, and token accounting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::cot::ChainOfThoughtOutput;
use crate::error::PipelineError;

/// Maximum accepted question length, in characters.
pub const MAX_QUESTION_CHARS: usize = 1000;

/// A single retrieved chunk with its similarity score and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub document_id: Uuid,
    pub chunk_index: usize,
    pub text: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl QueryResult {
    pub fn new(document_id: Uuid, chunk_index: usize, text: impl Into<String>, score: f64) -> Self {
        Self {
            document_id,
            chunk_index,
            text: text.into(),
            score,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Per-document rollup of the chunks that survived the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub document_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub chunk_count: usize,
    pub top_score: f64,
}

/// Collapses chunk-level results into one entry per document, preserving
/// first-seen order.
pub fn documents_from_results(results: &[QueryResult]) -> Vec<DocumentMetadata> {
    let mut documents: Vec<DocumentMetadata> = Vec::new();
    for result in results {
        match documents
            .iter_mut()
            .find(|d| d.document_id == result.document_id)
        {
            Some(doc) => {
                doc.chunk_count += 1;
                if result.score > doc.top_score {
                    doc.top_score = result.score;
                }
            }
            None => documents.push(DocumentMetadata {
                document_id: result.document_id,
                source: result.source.clone(),
                chunk_count: 1,
                top_score: result.score,
            }),
        }
    }
    documents
}

/// Declarative configuration for one technique inside a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechniqueConfig {
    pub technique_id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl TechniqueConfig {
    pub fn new(technique_id: impl Into<String>) -> Self {
        Self {
            technique_id: technique_id.into(),
            enabled: true,
            config: HashMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Named technique presets selectable on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechniquePreset {
    Default,
    Fast,
    Accurate,
    CostOptimized,
    Comprehensive,
}

impl TechniquePreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            TechniquePreset::Default => "default",
            TechniquePreset::Fast => "fast",
            TechniquePreset::Accurate => "accurate",
            TechniquePreset::CostOptimized => "cost_optimized",
            TechniquePreset::Comprehensive => "comprehensive",
        }
    }
}

impl std::fmt::Display for TechniquePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored pipeline definition, as resolved for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub pipeline_id: Uuid,
    pub collection_name: String,
    #[serde(default)]
    pub techniques: Vec<TechniqueConfig>,
}

/// An incoming answer request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub question: String,
    pub collection_id: Uuid,
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub techniques: Option<Vec<TechniqueConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technique_preset: Option<TechniquePreset>,
    /// Legacy free-form configuration, honored only when neither
    /// `techniques` nor `technique_preset` is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_metadata: Option<HashMap<String, Value>>,
}

impl SearchRequest {
    pub fn new(question: impl Into<String>, collection_id: Uuid, user_id: Uuid) -> Self {
        Self {
            question: question.into(),
            collection_id,
            user_id,
            techniques: None,
            technique_preset: None,
            config_metadata: None,
        }
    }

    pub fn with_preset(mut self, preset: TechniquePreset) -> Self {
        self.technique_preset = Some(preset);
        self
    }

    pub fn with_techniques(mut self, techniques: Vec<TechniqueConfig>) -> Self {
        self.techniques = Some(techniques);
        self
    }

    pub fn with_config_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.config_metadata = Some(metadata);
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.question.trim().is_empty() {
            return Err(PipelineError::InvalidRequest {
                reason: "question must not be empty".into(),
            });
        }
        let chars = self.question.chars().count();
        if chars > MAX_QUESTION_CHARS {
            return Err(PipelineError::InvalidRequest {
                reason: format!(
                    "question is {chars} characters, maximum is {MAX_QUESTION_CHARS}"
                ),
            });
        }
        Ok(())
    }
}

/// Recorded performance of one technique execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechniqueMetrics {
    pub execution_time_ms: u64,
    pub tokens_used: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One timestamped entry in the per-request execution trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// The assembled answer returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub answer: String,
    pub documents: Vec<DocumentMetadata>,
    pub query_results: Vec<QueryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewritten_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cot_output: Option<ChainOfThoughtOutput>,
    pub techniques_applied: Vec<String>,
    pub technique_metrics: HashMap<String, TechniqueMetrics>,
    /// Wall-clock duration of the whole request, in seconds.
    pub execution_time: f64,
    pub token_usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub execution_trace: Vec<TraceEntry>,
}

/// Token counts accumulated across LLM calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Rough token count for budget accounting when the provider does not
/// report one. Four characters per token is close enough for English.
pub fn estimate_tokens(text: &str) -> u64 {
    ((text.len() as u64) / 4).max(1)
}

/// Static cost estimate for a built pipeline, summed from technique
/// metadata before anything executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub estimated_latency_ms: u64,
    pub token_cost_multiplier: f64,
}
