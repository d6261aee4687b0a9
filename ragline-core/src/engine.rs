//! The public entry point.
//!
//! [`AnswerEngine`] owns the technique registry, the injected
//! collaborators, and the stage executor. One engine serves many
//! concurrent requests; all per-request state lives in a
//! [`SearchContext`] created inside [`AnswerEngine::answer`].

use std::sync::Arc;

use tracing::info;

use crate::artifacts::{generate_artifacts, AnswerArtifact, ArtifactGenerator};
use crate::collab::{LlmClient, PipelineResolver, Reranker, Retriever};
use crate::config::EngineConfig;
use crate::context::SearchContext;
use crate::cot::{ChainOfThoughtService, QualityScorer, QuestionClassifier};
use crate::error::Result;
use crate::registry::TechniqueRegistry;
use crate::stages::PipelineExecutor;
use crate::techniques::default_registry;
use crate::types::{SearchRequest, SearchResponse};

pub struct AnswerEngine {
    registry: Arc<TechniqueRegistry>,
    llm: Arc<dyn LlmClient>,
    retriever: Arc<dyn Retriever>,
    reranker: Arc<dyn Reranker>,
    resolver: Arc<dyn PipelineResolver>,
    config: Arc<EngineConfig>,
    classifier: Option<Arc<dyn QuestionClassifier>>,
    scorer: Option<Arc<dyn QualityScorer>>,
    executor: PipelineExecutor,
    artifact_generators: Vec<Arc<dyn ArtifactGenerator>>,
}

impl AnswerEngine {
    /// Build an engine over the built-in technique registry.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        retriever: Arc<dyn Retriever>,
        reranker: Arc<dyn Reranker>,
        resolver: Arc<dyn PipelineResolver>,
        config: EngineConfig,
    ) -> Result<Self> {
        let registry = Arc::new(default_registry()?);
        Ok(Self::with_registry(
            registry, llm, retriever, reranker, resolver, config,
        ))
    }

    /// Build an engine over a caller-assembled registry, for deployments
    /// that register their own techniques next to the built-ins.
    pub fn with_registry(
        registry: Arc<TechniqueRegistry>,
        llm: Arc<dyn LlmClient>,
        retriever: Arc<dyn Retriever>,
        reranker: Arc<dyn Reranker>,
        resolver: Arc<dyn PipelineResolver>,
        config: EngineConfig,
    ) -> Self {
        let config = Arc::new(config);
        let executor = PipelineExecutor::new(registry.clone(), resolver.clone(), config.clone());
        Self {
            registry,
            llm,
            retriever,
            reranker,
            resolver,
            config,
            classifier: None,
            scorer: None,
            executor,
            artifact_generators: Vec::new(),
        }
    }

    /// Replace the reasoning classifier (heuristic by default).
    pub fn with_classifier(mut self, classifier: Arc<dyn QuestionClassifier>) -> Self {
        self.classifier = Some(classifier);
        self.rebuild_executor();
        self
    }

    /// Replace the reasoning quality scorer (heuristic by default).
    pub fn with_quality_scorer(mut self, scorer: Arc<dyn QualityScorer>) -> Self {
        self.scorer = Some(scorer);
        self.rebuild_executor();
        self
    }

    pub fn with_artifact_generators(
        mut self,
        generators: Vec<Arc<dyn ArtifactGenerator>>,
    ) -> Self {
        self.artifact_generators = generators;
        self
    }

    pub fn registry(&self) -> &TechniqueRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn rebuild_executor(&mut self) {
        let mut service = ChainOfThoughtService::new(self.config.cot.clone());
        if let Some(classifier) = &self.classifier {
            service = service.with_classifier(classifier.clone());
        }
        if let Some(scorer) = &self.scorer {
            service = service.with_scorer(scorer.clone());
        }
        self.executor = PipelineExecutor::with_reasoning_service(
            self.registry.clone(),
            self.resolver.clone(),
            self.config.clone(),
            service,
        );
    }

    /// Answer one request end to end.
    ///
    /// Validation happens before any stage runs; a rejected request has
    /// made no external call. On a fatal stage failure the partial
    /// context is dropped and only the error is returned.
    pub async fn answer(&self, request: SearchRequest) -> Result<SearchResponse> {
        request.validate()?;
        info!(
            user_id = %request.user_id,
            collection_id = %request.collection_id,
            question_chars = request.question.chars().count(),
            "answer request received"
        );

        let mut ctx = SearchContext::new(
            &request,
            self.llm.clone(),
            self.retriever.clone(),
            self.reranker.clone(),
            &self.config,
        );
        self.executor.execute(&mut ctx).await?;

        let response = ctx.into_response();
        info!(
            techniques = ?response.techniques_applied,
            execution_time = response.execution_time,
            tokens = response.token_usage.total(),
            errors = response.errors.len(),
            "answer request finished"
        );
        Ok(response)
    }

    /// Answer one request, then run the configured artifact generators
    /// against the finished response.
    pub async fn answer_with_artifacts(
        &self,
        request: SearchRequest,
    ) -> Result<(SearchResponse, Vec<AnswerArtifact>)> {
        let response = self.answer(request).await?;
        let artifacts = generate_artifacts(&self.artifact_generators, &response).await;
        Ok((response, artifacts))
    }
}
