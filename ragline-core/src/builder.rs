//! Technique pipeline assembly and execution.
//!
//! The builder accumulates technique configs, validates them against the
//! registry (including the stage ordering rule), and produces an
//! executable [`TechniquePipeline`]. Execution is resilient: a failing
//! technique is recorded in the context metrics and the pipeline moves
//! on to the next one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::context::TechniqueContext;
use crate::error::TechniqueError;
use crate::registry::{Technique, TechniqueRegistry, TechniqueStage};
use crate::types::{CostEstimate, TechniqueConfig, TechniqueMetrics};

/// The full record of one technique execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TechniqueResult {
    pub technique_id: String,
    pub success: bool,
    pub output: Value,
    pub execution_time_ms: u64,
    pub tokens_used: u64,
    pub error: Option<String>,
    pub fallback_used: bool,
}

impl TechniqueResult {
    pub fn metrics(&self) -> TechniqueMetrics {
        TechniqueMetrics {
            execution_time_ms: self.execution_time_ms,
            tokens_used: self.tokens_used,
            success: self.success,
            fallback_used: self.fallback_used,
            error: self.error.clone(),
        }
    }
}

/// Fluent builder for a [`TechniquePipeline`].
pub struct TechniquePipelineBuilder {
    registry: Arc<TechniqueRegistry>,
    entries: Vec<TechniqueConfig>,
}

impl TechniquePipelineBuilder {
    pub fn new(registry: Arc<TechniqueRegistry>) -> Self {
        Self {
            registry,
            entries: Vec::new(),
        }
    }

    pub fn from_plan(registry: Arc<TechniqueRegistry>, plan: Vec<TechniqueConfig>) -> Self {
        Self {
            registry,
            entries: plan,
        }
    }

    pub fn add(mut self, technique_id: impl Into<String>, config: HashMap<String, Value>) -> Self {
        self.entries.push(TechniqueConfig {
            technique_id: technique_id.into(),
            enabled: true,
            config,
        });
        self
    }

    pub fn add_config(mut self, config: TechniqueConfig) -> Self {
        self.entries.push(config);
        self
    }

    fn enabled_ids(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.technique_id.as_str())
            .collect()
    }

    /// Check registration and stage ordering without instantiating
    /// anything.
    pub fn validate(&self) -> Result<(), TechniqueError> {
        self.registry.validate_pipeline(&self.enabled_ids())
    }

    /// Validate, instantiate each technique, and run its config check.
    pub fn build(self) -> Result<TechniquePipeline, TechniqueError> {
        self.validate()?;
        let mut steps = Vec::new();
        for entry in self.entries.into_iter().filter(|e| e.enabled) {
            let technique = self.registry.get(&entry.technique_id)?;
            technique.validate_config(&entry.config)?;
            steps.push(PipelineStep {
                technique,
                config: entry.config,
            });
        }
        Ok(TechniquePipeline { steps })
    }
}

#[derive(Debug)]
struct PipelineStep {
    technique: Arc<dyn Technique>,
    config: HashMap<String, Value>,
}

/// An ordered, validated sequence of techniques ready to execute.
#[derive(Debug)]
pub struct TechniquePipeline {
    steps: Vec<PipelineStep>,
}

impl TechniquePipeline {
    pub fn technique_ids(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|s| s.technique.metadata().id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Ids of the techniques whose stage falls inside `window`, in
    /// pipeline order.
    pub fn ids_in_window(&self, window: &[TechniqueStage]) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| window.contains(&s.technique.metadata().stage))
            .map(|s| s.technique.metadata().id.clone())
            .collect()
    }

    /// Sum the static cost metadata of every step.
    pub fn estimated_cost(&self) -> CostEstimate {
        let mut estimate = CostEstimate::default();
        for step in &self.steps {
            let metadata = step.technique.metadata();
            estimate.estimated_latency_ms += metadata.estimated_latency_ms;
            estimate.token_cost_multiplier += metadata.token_cost_multiplier;
        }
        estimate
    }

    /// Execute every step in order. Failures are recorded, not
    /// propagated.
    pub async fn execute(&self, ctx: &mut TechniqueContext) -> Vec<TechniqueResult> {
        let mut results = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            results.push(self.execute_step(step, ctx).await);
        }
        results
    }

    /// Execute only the steps whose stage falls inside `window`.
    pub async fn execute_window(
        &self,
        window: &[TechniqueStage],
        ctx: &mut TechniqueContext,
    ) -> Vec<TechniqueResult> {
        let mut results = Vec::new();
        for step in &self.steps {
            if window.contains(&step.technique.metadata().stage) {
                results.push(self.execute_step(step, ctx).await);
            }
        }
        results
    }

    async fn execute_step(
        &self,
        step: &PipelineStep,
        ctx: &mut TechniqueContext,
    ) -> TechniqueResult {
        let id = step.technique.metadata().id.clone();
        ctx.trace(format!("Executing: {id}"));
        ctx.merge_config(&step.config);

        let tokens_before = ctx.usage.total();
        let start = Instant::now();
        let outcome = step.technique.execute(ctx).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;
        let tokens_used = ctx.usage.total().saturating_sub(tokens_before);

        let result = match outcome {
            Ok(output) => {
                debug!(
                    technique = %id,
                    execution_time_ms,
                    tokens_used,
                    fallback_used = output.fallback_used,
                    "technique completed"
                );
                TechniqueResult {
                    technique_id: id.clone(),
                    success: true,
                    output: output.output,
                    execution_time_ms,
                    tokens_used,
                    error: output.note,
                    fallback_used: output.fallback_used,
                }
            }
            Err(err) => {
                warn!(technique = %id, error = %err, "technique failed, continuing");
                TechniqueResult {
                    technique_id: id.clone(),
                    success: false,
                    output: Value::Null,
                    execution_time_ms,
                    tokens_used,
                    error: Some(err.to_string()),
                    fallback_used: false,
                }
            }
        };

        if result.success && !result.output.is_null() {
            ctx.intermediate_results
                .insert(id.clone(), result.output.clone());
        }
        ctx.metrics.insert(id, result.metrics());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{MockLlmClient, MockReranker, MockRetriever};
    use crate::config::TimeoutConfig;
    use crate::registry::{TechniqueMetadata, TechniqueOutput};
    use async_trait::async_trait;
    use serde_json::json;
    use uuid::Uuid;

    fn metadata(id: &str, stage: TechniqueStage, latency: u64, multiplier: f64) -> TechniqueMetadata {
        TechniqueMetadata {
            id: id.to_string(),
            stage,
            requires_llm: false,
            requires_embeddings: false,
            estimated_latency_ms: latency,
            token_cost_multiplier: multiplier,
        }
    }

    /// Appends its id to `intermediate_results`; fails when built with
    /// `fail = true`; rejects configs containing a "bad" key.
    struct ProbeTechnique {
        metadata: TechniqueMetadata,
        fail: bool,
    }

    #[async_trait]
    impl Technique for ProbeTechnique {
        fn metadata(&self) -> &TechniqueMetadata {
            &self.metadata
        }

        fn validate_config(
            &self,
            config: &HashMap<String, Value>,
        ) -> Result<(), TechniqueError> {
            if config.contains_key("bad") {
                return Err(TechniqueError::InvalidConfig {
                    technique: self.metadata.id.clone(),
                    key: "bad".into(),
                    reason: "unsupported key".into(),
                });
            }
            Ok(())
        }

        async fn execute(
            &self,
            ctx: &mut TechniqueContext,
        ) -> Result<TechniqueOutput, TechniqueError> {
            if self.fail {
                return Err(TechniqueError::failed(
                    self.metadata.id.clone(),
                    "induced failure",
                ));
            }
            Ok(TechniqueOutput::new(json!({
                "ran": self.metadata.id,
                "saw_top_k": ctx.config_usize("top_k"),
            })))
        }
    }

    fn probe_registry(entries: &[(&str, TechniqueStage, bool)]) -> Arc<TechniqueRegistry> {
        let mut registry = TechniqueRegistry::new();
        for (id, stage, fail) in entries {
            let meta = metadata(id, *stage, 100, 0.5);
            let factory_meta = meta.clone();
            let fail = *fail;
            registry
                .register(meta, true, move || {
                    Arc::new(ProbeTechnique {
                        metadata: factory_meta.clone(),
                        fail,
                    })
                })
                .unwrap();
        }
        Arc::new(registry)
    }

    fn test_context() -> TechniqueContext {
        let mut ctx = TechniqueContext::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "why do rerankers help precision",
            Arc::new(MockLlmClient::new()),
            Arc::new(MockRetriever::new()),
            Arc::new(MockReranker::new()),
            TimeoutConfig::default(),
        );
        ctx.resolve_collection("docs");
        ctx
    }

    #[test]
    fn test_build_rejects_unknown_technique() {
        let registry = probe_registry(&[("fetch", TechniqueStage::Retrieval, false)]);
        let err = TechniquePipelineBuilder::new(registry)
            .add("fetch", HashMap::new())
            .add("ghost", HashMap::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, TechniqueError::UnknownTechnique { id } if id == "ghost"));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let registry = probe_registry(&[("fetch", TechniqueStage::Retrieval, false)]);
        let mut config = HashMap::new();
        config.insert("bad".to_string(), json!(true));
        let err = TechniquePipelineBuilder::new(registry)
            .add("fetch", config)
            .build()
            .unwrap_err();
        assert!(matches!(err, TechniqueError::InvalidConfig { .. }));
    }

    #[test]
    fn test_build_rejects_bad_ordering() {
        let registry = probe_registry(&[
            ("rewrite", TechniqueStage::QueryTransform, false),
            ("fetch", TechniqueStage::Retrieval, false),
        ]);
        let err = TechniquePipelineBuilder::new(registry)
            .add("fetch", HashMap::new())
            .add("rewrite", HashMap::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, TechniqueError::OrderingViolation { .. }));
    }

    #[test]
    fn test_disabled_entries_are_skipped() {
        let registry = probe_registry(&[
            ("fetch", TechniqueStage::Retrieval, false),
            ("rerank", TechniqueStage::Reranking, false),
        ]);
        let pipeline = TechniquePipelineBuilder::new(registry)
            .add_config(TechniqueConfig::new("fetch"))
            .add_config(TechniqueConfig::new("rerank").disabled())
            .build()
            .unwrap();
        assert_eq!(pipeline.technique_ids(), vec!["fetch"]);
    }

    #[test]
    fn test_estimated_cost_sums_metadata() {
        let registry = probe_registry(&[
            ("fetch", TechniqueStage::Retrieval, false),
            ("rerank", TechniqueStage::Reranking, false),
        ]);
        let pipeline = TechniquePipelineBuilder::new(registry)
            .add("fetch", HashMap::new())
            .add("rerank", HashMap::new())
            .build()
            .unwrap();
        let estimate = pipeline.estimated_cost();
        assert_eq!(estimate.estimated_latency_ms, 200);
        assert_eq!(estimate.token_cost_multiplier, 1.0);
    }

    #[tokio::test]
    async fn test_execution_is_resilient_to_failures() {
        let registry = probe_registry(&[
            ("first", TechniqueStage::Retrieval, false),
            ("broken", TechniqueStage::PostRetrieval, true),
            ("last", TechniqueStage::Reranking, false),
        ]);
        let pipeline = TechniquePipelineBuilder::new(registry)
            .add("first", HashMap::new())
            .add("broken", HashMap::new())
            .add("last", HashMap::new())
            .build()
            .unwrap();

        let mut ctx = test_context();
        let results = pipeline.execute(&mut ctx).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[2].success);
        assert_eq!(ctx.metrics.len(), 3);
        assert!(!ctx.metrics["broken"].success);
        assert!(ctx.metrics["broken"].error.as_deref().unwrap().contains("induced failure"));
        // The failing step leaves no intermediate output behind.
        assert!(ctx.intermediate_results.contains_key("first"));
        assert!(!ctx.intermediate_results.contains_key("broken"));
        assert!(ctx.intermediate_results.contains_key("last"));
    }

    #[tokio::test]
    async fn test_execution_merges_step_config_and_traces() {
        let registry = probe_registry(&[("fetch", TechniqueStage::Retrieval, false)]);
        let mut config = HashMap::new();
        config.insert("top_k".to_string(), json!(25));
        let pipeline = TechniquePipelineBuilder::new(registry)
            .add("fetch", config)
            .build()
            .unwrap();

        let mut ctx = test_context();
        let results = pipeline.execute(&mut ctx).await;

        assert_eq!(results[0].output["saw_top_k"], json!(25));
        assert_eq!(ctx.config_usize("top_k"), Some(25));
        let trace: Vec<&str> = ctx
            .execution_trace
            .iter()
            .map(|e| e.message.as_str())
            .collect();
        assert_eq!(trace, vec!["Executing: fetch"]);
    }

    #[tokio::test]
    async fn test_execute_window_filters_by_stage() {
        let registry = probe_registry(&[
            ("rewrite", TechniqueStage::QueryTransform, false),
            ("fetch", TechniqueStage::Retrieval, false),
            ("rerank", TechniqueStage::Reranking, false),
        ]);
        let pipeline = TechniquePipelineBuilder::new(registry)
            .add("rewrite", HashMap::new())
            .add("fetch", HashMap::new())
            .add("rerank", HashMap::new())
            .build()
            .unwrap();

        let mut ctx = test_context();
        let results = pipeline
            .execute_window(
                &[TechniqueStage::Retrieval, TechniqueStage::PostRetrieval],
                &mut ctx,
            )
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].technique_id, "fetch");
        assert_eq!(
            pipeline.ids_in_window(&[TechniqueStage::Reranking, TechniqueStage::Compression]),
            vec!["rerank"]
        );
    }
}
