//! Per-request execution state.
//!
//! [`TechniqueContext`] is the object techniques read and mutate;
//! [`SearchContext`] wraps it with the macro-pipeline state the six
//! stages operate on. Both are request-scoped and dropped once the
//! response is assembled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::time::timeout;
use uuid::Uuid;

use crate::builder::TechniquePipeline;
use crate::collab::{Generation, LlmClient, Reranker, Retriever};
use crate::config::{EngineConfig, TimeoutConfig};
use crate::cot::ChainOfThoughtOutput;
use crate::error::{GenerationError, RerankError, RetrievalError};
use crate::types::{
    documents_from_results, estimate_tokens, QueryResult, SearchRequest, SearchResponse,
    TechniqueConfig, TechniqueMetrics, TechniquePreset, TokenUsage, TraceEntry,
};

/// The immutable identity of a request. Created once at entry; no
/// technique or stage writes to it after resolution.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub user_id: Uuid,
    pub collection_id: Uuid,
    /// Empty until the resolution stage fills it in; read-only afterwards.
    pub collection_name: String,
    pub original_query: String,
}

/// Mutable state threaded through a technique pipeline.
///
/// Writer discipline: `current_query` and `retrieved_documents` are
/// written only by the technique currently executing (the `&mut`
/// receiver enforces one writer at a time); `metrics`,
/// `intermediate_results`, and `execution_trace` are append-only.
pub struct TechniqueContext {
    identity: RequestIdentity,
    pub current_query: String,
    pub retrieved_documents: Vec<QueryResult>,
    /// Per-technique JSON summaries, keyed by technique id.
    pub intermediate_results: HashMap<String, Value>,
    /// Merged per-technique configuration, visible to later techniques.
    pub config: HashMap<String, Value>,
    pub metrics: HashMap<String, TechniqueMetrics>,
    pub execution_trace: Vec<TraceEntry>,
    pub usage: TokenUsage,
    llm: Arc<dyn LlmClient>,
    retriever: Arc<dyn Retriever>,
    reranker: Arc<dyn Reranker>,
    timeouts: TimeoutConfig,
}

impl TechniqueContext {
    pub fn new(
        user_id: Uuid,
        collection_id: Uuid,
        query: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        retriever: Arc<dyn Retriever>,
        reranker: Arc<dyn Reranker>,
        timeouts: TimeoutConfig,
    ) -> Self {
        let query = query.into();
        Self {
            identity: RequestIdentity {
                user_id,
                collection_id,
                collection_name: String::new(),
                original_query: query.clone(),
            },
            current_query: query,
            retrieved_documents: Vec::new(),
            intermediate_results: HashMap::new(),
            config: HashMap::new(),
            metrics: HashMap::new(),
            execution_trace: Vec::new(),
            usage: TokenUsage::default(),
            llm,
            retriever,
            reranker,
            timeouts,
        }
    }

    pub fn identity(&self) -> &RequestIdentity {
        &self.identity
    }

    /// Set the resolved collection name. Called exactly once, by the
    /// resolution stage.
    pub fn resolve_collection(&mut self, name: impl Into<String>) {
        self.identity.collection_name = name.into();
    }

    /// Append a timestamped entry to the execution trace.
    pub fn trace(&mut self, message: impl Into<String>) {
        self.execution_trace.push(TraceEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }

    pub fn merge_config(&mut self, other: &HashMap<String, Value>) {
        for (key, value) in other {
            self.config.insert(key.clone(), value.clone());
        }
    }

    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(Value::as_u64)
    }

    pub fn config_usize(&self, key: &str) -> Option<usize> {
        self.config_u64(key).map(|v| v as usize)
    }

    pub fn config_f64(&self, key: &str) -> Option<f64> {
        self.config.get(key).and_then(Value::as_f64)
    }

    pub fn config_bool(&self, key: &str) -> Option<bool> {
        self.config.get(key).and_then(Value::as_bool)
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// Call the LLM with the configured deadline, accumulating token
    /// usage on success.
    pub async fn generate(
        &mut self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Generation, GenerationError> {
        let deadline = Duration::from_secs(self.timeouts.llm_secs);
        let result = timeout(deadline, self.llm.generate(prompt, max_tokens, temperature))
            .await
            .map_err(|_| GenerationError::Timeout {
                timeout_secs: self.timeouts.llm_secs,
            })?;
        let generation = result?;
        self.usage.accumulate(&TokenUsage {
            input_tokens: estimate_tokens(prompt),
            output_tokens: generation.token_count,
        });
        Ok(generation)
    }

    /// Search the resolved collection with the configured deadline.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<QueryResult>, RetrievalError> {
        let deadline = Duration::from_secs(self.timeouts.retrieval_secs);
        timeout(
            deadline,
            self.retriever
                .retrieve(&self.identity.collection_name, query, top_k),
        )
        .await
        .map_err(|_| RetrievalError::Timeout {
            timeout_secs: self.timeouts.retrieval_secs,
        })?
    }

    /// Rerank documents with the configured deadline.
    pub async fn rerank(
        &self,
        query: &str,
        documents: Vec<QueryResult>,
        top_k: usize,
    ) -> Result<Vec<QueryResult>, RerankError> {
        let deadline = Duration::from_secs(self.timeouts.rerank_secs);
        timeout(deadline, self.reranker.rerank(query, documents, top_k))
            .await
            .map_err(|_| RerankError::Timeout {
                timeout_secs: self.timeouts.rerank_secs,
            })?
    }
}

/// Macro-pipeline state for one request, created at entry and consumed
/// into a [`SearchResponse`].
pub struct SearchContext {
    /// Resolved pipeline configuration id; a fresh run id until the
    /// resolution stage overwrites it.
    pub pipeline_id: Uuid,
    pub technique_context: TechniqueContext,
    pub requested_techniques: Option<Vec<TechniqueConfig>>,
    pub requested_preset: Option<TechniquePreset>,
    pub config_metadata: Option<HashMap<String, Value>>,
    /// The selected technique plan, set by the resolution stage.
    pub plan: Vec<TechniqueConfig>,
    /// The built pipeline, set by the executor after validation.
    pub pipeline: Option<Arc<TechniquePipeline>>,
    /// Final chunk set after retrieval and reranking.
    pub query_results: Vec<QueryResult>,
    pub rewritten_query: Option<String>,
    pub generated_answer: Option<String>,
    pub cot_output: Option<ChainOfThoughtOutput>,
    /// Non-fatal stage failures, in occurrence order.
    pub errors: Vec<String>,
    started_at: Instant,
}

impl SearchContext {
    pub fn new(
        request: &SearchRequest,
        llm: Arc<dyn LlmClient>,
        retriever: Arc<dyn Retriever>,
        reranker: Arc<dyn Reranker>,
        config: &EngineConfig,
    ) -> Self {
        let mut technique_context = TechniqueContext::new(
            request.user_id,
            request.collection_id,
            request.question.clone(),
            llm,
            retriever,
            reranker,
            config.timeouts,
        );
        technique_context.config.insert(
            "top_k".to_string(),
            Value::from(config.retrieval.default_top_k as u64),
        );
        Self {
            pipeline_id: Uuid::new_v4(),
            technique_context,
            requested_techniques: request.techniques.clone(),
            requested_preset: request.technique_preset,
            config_metadata: request.config_metadata.clone(),
            plan: Vec::new(),
            pipeline: None,
            query_results: Vec::new(),
            rewritten_query: None,
            generated_answer: None,
            cot_output: None,
            errors: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Executed technique ids, in pipeline order.
    pub fn techniques_applied(&self) -> Vec<String> {
        match &self.pipeline {
            Some(pipeline) => pipeline
                .technique_ids()
                .into_iter()
                .filter(|id| self.technique_context.metrics.contains_key(id))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn into_response(self) -> SearchResponse {
        let execution_time = self.elapsed_seconds();
        let techniques_applied = self.techniques_applied();
        let documents = documents_from_results(&self.query_results);
        SearchResponse {
            answer: self.generated_answer.unwrap_or_default(),
            documents,
            query_results: self.query_results,
            rewritten_query: self.rewritten_query,
            cot_output: self.cot_output,
            techniques_applied,
            technique_metrics: self.technique_context.metrics,
            execution_time,
            token_usage: self.technique_context.usage,
            errors: self.errors,
            execution_trace: self.technique_context.execution_trace,
        }
    }
}
