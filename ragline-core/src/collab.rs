//! Capability traits for the external collaborators the pipeline depends
//! on: vector retrieval, reranking, answer generation, and pipeline
//! resolution. Concrete clients live outside this crate; the mocks here
//! back the test suites and local development.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{GenerationError, RerankError, ResolutionError, RetrievalError};
use crate::types::{estimate_tokens, PipelineConfig, QueryResult};

/// One LLM completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub token_count: u64,
}

impl Generation {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let token_count = estimate_tokens(&text);
        Self { text, token_count }
    }
}

/// Vector store search.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        collection_name: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<QueryResult>, RetrievalError>;
}

/// Cross-encoder or LLM-based relevance reordering.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<QueryResult>,
        top_k: usize,
    ) -> Result<Vec<QueryResult>, RerankError>;
}

/// Text completion provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Generation, GenerationError>;
}

/// Looks up the stored default pipeline for a user.
#[async_trait]
pub trait PipelineResolver: Send + Sync {
    async fn resolve_default_pipeline(
        &self,
        user_id: Uuid,
    ) -> Result<PipelineConfig, ResolutionError>;
}

/// A mock LLM client for testing and development.
///
/// Queued responses are returned in order; once the queue is empty every
/// call gets the default text. All prompts are recorded for assertions.
pub struct MockLlmClient {
    responses: Mutex<Vec<Result<Generation, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    default_text: String,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::with_default("Mock completion. No queued responses available.")
    }

    /// Create a client whose fallback response is the given text.
    pub fn with_default(text: &str) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            default_text: text.to_string(),
        }
    }

    /// Queue a successful completion for the next `generate` call.
    pub fn queue_text(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push(Ok(Generation::new(text)));
    }

    /// Queue a failure for the next `generate` call.
    pub fn queue_error(&self, error: GenerationError) {
        self.responses.lock().unwrap().push(Err(error));
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(
        &self,
        prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<Generation, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Generation::new(self.default_text.as_str()))
        } else {
            responses.remove(0)
        }
    }
}

/// A mock retriever backed by a fixed document set.
///
/// Queued results (or errors) take precedence; once drained, every call
/// returns the fixed documents truncated to `top_k`.
pub struct MockRetriever {
    documents: Vec<QueryResult>,
    queued: Mutex<Vec<Result<Vec<QueryResult>, RetrievalError>>>,
    fail_message: Mutex<Option<String>>,
    calls: Mutex<Vec<RecordedRetrieval>>,
}

/// Arguments of one recorded `retrieve` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRetrieval {
    pub collection_name: String,
    pub query: String,
    pub top_k: usize,
}

impl MockRetriever {
    pub fn new() -> Self {
        Self::with_documents(Vec::new())
    }

    pub fn with_documents(documents: Vec<QueryResult>) -> Self {
        Self {
            documents,
            queued: Mutex::new(Vec::new()),
            fail_message: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A retriever whose every call fails with a backend error, unless a
    /// queued result covers the call first.
    pub fn failing(message: &str) -> Self {
        let retriever = Self::new();
        *retriever.fail_message.lock().unwrap() = Some(message.to_string());
        retriever
    }

    /// Queue an explicit result for the next `retrieve` call.
    pub fn queue_result(&self, result: Result<Vec<QueryResult>, RetrievalError>) {
        self.queued.lock().unwrap().push(result);
    }

    pub fn calls(&self) -> Vec<RecordedRetrieval> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockRetriever {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn retrieve(
        &self,
        collection_name: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<QueryResult>, RetrievalError> {
        self.calls.lock().unwrap().push(RecordedRetrieval {
            collection_name: collection_name.to_string(),
            query: query.to_string(),
            top_k,
        });
        let mut queued = self.queued.lock().unwrap();
        if !queued.is_empty() {
            return queued.remove(0);
        }
        if let Some(message) = self.fail_message.lock().unwrap().as_ref() {
            return Err(RetrievalError::Backend {
                message: message.clone(),
            });
        }
        let mut documents = self.documents.clone();
        documents.truncate(top_k);
        Ok(documents)
    }
}

/// A mock reranker that sorts by score descending and truncates.
pub struct MockReranker {
    queued_errors: Mutex<Vec<RerankError>>,
    queries: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockReranker {
    pub fn new() -> Self {
        Self {
            queued_errors: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a failure for the next `rerank` call.
    pub fn queue_error(&self, error: RerankError) {
        self.queued_errors.lock().unwrap().push(error);
    }

    /// Queries received so far, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockReranker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reranker for MockReranker {
    async fn rerank(
        &self,
        query: &str,
        mut documents: Vec<QueryResult>,
        top_k: usize,
    ) -> Result<Vec<QueryResult>, RerankError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        let mut queued = self.queued_errors.lock().unwrap();
        if !queued.is_empty() {
            return Err(queued.remove(0));
        }
        documents.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        documents.truncate(top_k);
        Ok(documents)
    }
}

/// A mock resolver returning a fixed pipeline config.
pub struct MockPipelineResolver {
    config: PipelineConfig,
    error: Option<ResolutionError>,
}

impl MockPipelineResolver {
    pub fn new(collection_name: &str) -> Self {
        Self {
            config: PipelineConfig {
                pipeline_id: Uuid::new_v4(),
                collection_name: collection_name.to_string(),
                techniques: Vec::new(),
            },
            error: None,
        }
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            config,
            error: None,
        }
    }

    /// A resolver whose every call fails with the given error.
    pub fn failing(error: ResolutionError) -> Self {
        Self {
            config: PipelineConfig {
                pipeline_id: Uuid::nil(),
                collection_name: String::new(),
                techniques: Vec::new(),
            },
            error: Some(error),
        }
    }
}

#[async_trait]
impl PipelineResolver for MockPipelineResolver {
    async fn resolve_default_pipeline(
        &self,
        _user_id: Uuid,
    ) -> Result<PipelineConfig, ResolutionError> {
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(self.config.clone()),
        }
    }
}
