//! Technique registration and pipeline ordering rules.
//!
//! The registry maps technique ids to factories plus metadata captured at
//! registration time. Registration happens once at startup through an
//! explicit call list; afterwards the registry is shared read-only behind
//! an `Arc`, so lookups never lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::TechniqueContext;
use crate::error::TechniqueError;

/// Where in a pipeline a technique is allowed to run.
///
/// Declaration order is the total order used by pipeline validation:
/// a pipeline is valid when its stage sequence is non-decreasing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TechniqueStage {
    Preprocessing,
    QueryTransform,
    Retrieval,
    PostRetrieval,
    Reranking,
    Compression,
    Generation,
}

impl TechniqueStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TechniqueStage::Preprocessing => "preprocessing",
            TechniqueStage::QueryTransform => "query_transform",
            TechniqueStage::Retrieval => "retrieval",
            TechniqueStage::PostRetrieval => "post_retrieval",
            TechniqueStage::Reranking => "reranking",
            TechniqueStage::Compression => "compression",
            TechniqueStage::Generation => "generation",
        }
    }
}

impl fmt::Display for TechniqueStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of a technique, captured at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechniqueMetadata {
    pub id: String,
    pub stage: TechniqueStage,
    pub requires_llm: bool,
    pub requires_embeddings: bool,
    /// Typical wall-clock cost of one execution.
    pub estimated_latency_ms: u64,
    /// Relative token spend compared to a bare generation call.
    pub token_cost_multiplier: f64,
}

/// Output of a successful technique execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TechniqueOutput {
    pub output: Value,
    pub fallback_used: bool,
    /// Diagnostic carried alongside a degraded-but-successful result.
    pub note: Option<String>,
}

impl TechniqueOutput {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            fallback_used: false,
            note: None,
        }
    }

    pub fn fallback(output: Value, note: impl Into<String>) -> Self {
        Self {
            output,
            fallback_used: true,
            note: Some(note.into()),
        }
    }
}

/// A single pipeline operation: query rewriting, retrieval, reranking,
/// compression. Implementations mutate the shared [`TechniqueContext`]
/// and return a JSON summary of what they did.
#[async_trait]
pub trait Technique: Send + Sync {
    fn metadata(&self) -> &TechniqueMetadata;

    /// Reject malformed per-technique configuration at build time.
    fn validate_config(&self, config: &HashMap<String, Value>) -> Result<(), TechniqueError> {
        let _ = config;
        Ok(())
    }

    async fn execute(&self, ctx: &mut TechniqueContext) -> Result<TechniqueOutput, TechniqueError>;
}

impl fmt::Debug for dyn Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Technique")
            .field("id", &self.metadata().id)
            .finish()
    }
}

type TechniqueFactory = Box<dyn Fn() -> Arc<dyn Technique> + Send + Sync>;

struct Registration {
    metadata: TechniqueMetadata,
    factory: TechniqueFactory,
    /// Built eagerly at registration for techniques that opt in to
    /// instance sharing. Singleton techniques must be stateless.
    singleton: Option<Arc<dyn Technique>>,
}

/// Registry of available techniques.
#[derive(Default)]
pub struct TechniqueRegistry {
    entries: HashMap<String, Registration>,
}

impl TechniqueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(
        &mut self,
        metadata: TechniqueMetadata,
        singleton: bool,
        factory: F,
    ) -> Result<(), TechniqueError>
    where
        F: Fn() -> Arc<dyn Technique> + Send + Sync + 'static,
    {
        let id = metadata.id.clone();
        if self.entries.contains_key(&id) {
            return Err(TechniqueError::AlreadyRegistered { id });
        }
        let singleton = singleton.then(&factory);
        self.entries.insert(
            id,
            Registration {
                metadata,
                factory: Box::new(factory),
                singleton,
            },
        );
        Ok(())
    }

    /// Returns the shared instance for singleton techniques, a fresh
    /// instance otherwise.
    pub fn get(&self, id: &str) -> Result<Arc<dyn Technique>, TechniqueError> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| TechniqueError::UnknownTechnique { id: id.to_string() })?;
        Ok(match &entry.singleton {
            Some(instance) => Arc::clone(instance),
            None => (entry.factory)(),
        })
    }

    pub fn metadata(&self, id: &str) -> Option<&TechniqueMetadata> {
        self.entries.get(id).map(|e| &e.metadata)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// List registered techniques, optionally filtered by stage, ordered
    /// by (stage, id).
    pub fn list(&self, stage: Option<TechniqueStage>) -> Vec<&TechniqueMetadata> {
        let mut metadata: Vec<&TechniqueMetadata> = self
            .entries
            .values()
            .map(|e| &e.metadata)
            .filter(|m| stage.is_none_or(|s| m.stage == s))
            .collect();
        metadata.sort_by(|a, b| a.stage.cmp(&b.stage).then_with(|| a.id.cmp(&b.id)));
        metadata
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks that every id is registered and that the implied stage
    /// sequence is non-decreasing. Ties are allowed; a violation names
    /// both offending techniques.
    pub fn validate_pipeline(&self, ids: &[&str]) -> Result<(), TechniqueError> {
        let mut previous: Option<(&str, TechniqueStage)> = None;
        for id in ids {
            let metadata = self
                .metadata(id)
                .ok_or_else(|| TechniqueError::UnknownTechnique { id: id.to_string() })?;
            if let Some((after, after_stage)) = previous {
                if metadata.stage < after_stage {
                    return Err(TechniqueError::OrderingViolation {
                        technique: id.to_string(),
                        stage: metadata.stage,
                        after: after.to_string(),
                        after_stage,
                    });
                }
            }
            previous = Some((id, metadata.stage));
        }
        Ok(())
    }
}

impl fmt::Debug for TechniqueRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.list(None).iter().map(|m| m.id.as_str()).collect();
        f.debug_struct("TechniqueRegistry")
            .field("techniques", &ids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_metadata(id: &str, stage: TechniqueStage) -> TechniqueMetadata {
        TechniqueMetadata {
            id: id.to_string(),
            stage,
            requires_llm: false,
            requires_embeddings: false,
            estimated_latency_ms: 10,
            token_cost_multiplier: 0.0,
        }
    }

    struct NoopTechnique {
        metadata: TechniqueMetadata,
    }

    #[async_trait]
    impl Technique for NoopTechnique {
        fn metadata(&self) -> &TechniqueMetadata {
            &self.metadata
        }

        async fn execute(
            &self,
            _ctx: &mut TechniqueContext,
        ) -> Result<TechniqueOutput, TechniqueError> {
            Ok(TechniqueOutput::new(serde_json::json!({})))
        }
    }

    fn registry_with(entries: &[(&str, TechniqueStage, bool)]) -> TechniqueRegistry {
        let mut registry = TechniqueRegistry::new();
        for (id, stage, singleton) in entries {
            let metadata = noop_metadata(id, *stage);
            let factory_meta = metadata.clone();
            registry
                .register(metadata, *singleton, move || {
                    Arc::new(NoopTechnique {
                        metadata: factory_meta.clone(),
                    })
                })
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_register_and_get() {
        let registry = registry_with(&[("echo", TechniqueStage::Retrieval, true)]);
        assert!(registry.contains("echo"));
        assert!(registry.get("echo").is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_unknown_fails() {
        let registry = TechniqueRegistry::new();
        let err = registry.get("missing").unwrap_err();
        assert!(matches!(err, TechniqueError::UnknownTechnique { id } if id == "missing"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = registry_with(&[("echo", TechniqueStage::Retrieval, true)]);
        let err = registry
            .register(noop_metadata("echo", TechniqueStage::Retrieval), false, || {
                Arc::new(NoopTechnique {
                    metadata: noop_metadata("echo", TechniqueStage::Retrieval),
                })
            })
            .unwrap_err();
        assert!(matches!(err, TechniqueError::AlreadyRegistered { id } if id == "echo"));
    }

    #[test]
    fn test_singleton_returns_same_instance() {
        let registry = registry_with(&[("shared", TechniqueStage::Reranking, true)]);
        let a = registry.get("shared").unwrap();
        let b = registry.get("shared").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_non_singleton_returns_fresh_instances() {
        let registry = registry_with(&[("fresh", TechniqueStage::Reranking, false)]);
        let a = registry.get("fresh").unwrap();
        let b = registry.get("fresh").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let registry = registry_with(&[
            ("rerank_b", TechniqueStage::Reranking, true),
            ("fetch", TechniqueStage::Retrieval, true),
            ("rerank_a", TechniqueStage::Reranking, true),
            ("rewrite", TechniqueStage::QueryTransform, true),
        ]);

        let all: Vec<&str> = registry.list(None).iter().map(|m| m.id.as_str()).collect();
        assert_eq!(all, vec!["rewrite", "fetch", "rerank_a", "rerank_b"]);

        let reranking: Vec<&str> = registry
            .list(Some(TechniqueStage::Reranking))
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(reranking, vec!["rerank_a", "rerank_b"]);
    }

    #[test]
    fn test_validate_pipeline_accepts_non_decreasing() {
        let registry = registry_with(&[
            ("rewrite", TechniqueStage::QueryTransform, true),
            ("fetch", TechniqueStage::Retrieval, true),
            ("expand", TechniqueStage::Retrieval, true),
            ("rerank", TechniqueStage::Reranking, true),
        ]);
        registry
            .validate_pipeline(&["rewrite", "fetch", "expand", "rerank"])
            .unwrap();
        // Ties within a stage are allowed in either order.
        registry
            .validate_pipeline(&["expand", "fetch", "rerank"])
            .unwrap();
        registry.validate_pipeline(&[]).unwrap();
    }

    #[test]
    fn test_validate_pipeline_rejects_decreasing() {
        let registry = registry_with(&[
            ("rewrite", TechniqueStage::QueryTransform, true),
            ("fetch", TechniqueStage::Retrieval, true),
        ]);
        let err = registry
            .validate_pipeline(&["fetch", "rewrite"])
            .unwrap_err();
        match err {
            TechniqueError::OrderingViolation {
                technique,
                stage,
                after,
                after_stage,
            } => {
                assert_eq!(technique, "rewrite");
                assert_eq!(stage, TechniqueStage::QueryTransform);
                assert_eq!(after, "fetch");
                assert_eq!(after_stage, TechniqueStage::Retrieval);
            }
            other => panic!("expected ordering violation, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_pipeline_unknown_id() {
        let registry = registry_with(&[("fetch", TechniqueStage::Retrieval, true)]);
        let err = registry
            .validate_pipeline(&["fetch", "ghost"])
            .unwrap_err();
        assert!(matches!(err, TechniqueError::UnknownTechnique { id } if id == "ghost"));
    }

    #[test]
    fn test_stage_total_order() {
        use TechniqueStage::*;
        let order = [
            Preprocessing,
            QueryTransform,
            Retrieval,
            PostRetrieval,
            Reranking,
            Compression,
            Generation,
        ];
        for window in order.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn test_stage_serde_snake_case() {
        let stage: TechniqueStage = serde_json::from_str(r#""post_retrieval""#).unwrap();
        assert_eq!(stage, TechniqueStage::PostRetrieval);
        assert_eq!(stage.to_string(), "post_retrieval");
    }
}
