//! Built-in pipeline techniques.
//!
//! Each technique is a small adapter over the collaborator traits,
//! registered at startup via [`register_builtin_techniques`]. Adding a
//! technique means implementing [`Technique`](crate::registry::Technique)
//! and adding one registration line here.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::TechniqueError;
use crate::registry::{Technique, TechniqueRegistry};

pub mod contextual_compression;
pub mod fusion_retrieval;
pub mod hyde;
pub mod query_transformation;
pub mod reranking;
pub mod vector_retrieval;

pub use contextual_compression::ContextualCompression;
pub use fusion_retrieval::FusionRetrieval;
pub use hyde::Hyde;
pub use query_transformation::QueryTransformation;
pub use reranking::Reranking;
pub use vector_retrieval::VectorRetrieval;

/// Stable ids of the built-in techniques.
pub mod ids {
    pub const VECTOR_RETRIEVAL: &str = "vector_retrieval";
    pub const FUSION_RETRIEVAL: &str = "fusion_retrieval";
    pub const QUERY_TRANSFORMATION: &str = "query_transformation";
    pub const HYDE: &str = "hyde";
    pub const RERANKING: &str = "reranking";
    pub const CONTEXTUAL_COMPRESSION: &str = "contextual_compression";
}

pub(crate) fn validate_top_k(
    technique: &str,
    config: &HashMap<String, Value>,
) -> Result<(), TechniqueError> {
    if let Some(value) = config.get("top_k") {
        let valid = value.as_u64().is_some_and(|v| v > 0);
        if !valid {
            return Err(TechniqueError::InvalidConfig {
                technique: technique.to_string(),
                key: "top_k".into(),
                reason: "must be a positive integer".into(),
            });
        }
    }
    Ok(())
}

fn register_one<T, F>(
    registry: &mut TechniqueRegistry,
    singleton: bool,
    factory: F,
) -> Result<(), TechniqueError>
where
    T: Technique + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    let metadata = factory().metadata().clone();
    registry.register(metadata, singleton, move || {
        let technique: Arc<dyn Technique> = Arc::new(factory());
        technique
    })
}

/// Register every built-in technique. All built-ins are stateless and
/// registered as singletons.
pub fn register_builtin_techniques(
    registry: &mut TechniqueRegistry,
) -> Result<(), TechniqueError> {
    register_one(registry, true, QueryTransformation::new)?;
    register_one(registry, true, Hyde::new)?;
    register_one(registry, true, VectorRetrieval::new)?;
    register_one(registry, true, FusionRetrieval::new)?;
    register_one(registry, true, Reranking::new)?;
    register_one(registry, true, ContextualCompression::new)?;
    Ok(())
}

/// A registry pre-populated with the built-in techniques.
pub fn default_registry() -> Result<TechniqueRegistry, TechniqueError> {
    let mut registry = TechniqueRegistry::new();
    register_builtin_techniques(&mut registry)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TechniqueStage;

    #[test]
    fn test_default_registry_contains_builtins() {
        let registry = default_registry().unwrap();
        assert_eq!(registry.len(), 6);
        for id in [
            ids::VECTOR_RETRIEVAL,
            ids::FUSION_RETRIEVAL,
            ids::QUERY_TRANSFORMATION,
            ids::HYDE,
            ids::RERANKING,
            ids::CONTEXTUAL_COMPRESSION,
        ] {
            assert!(registry.contains(id), "missing builtin {id}");
        }
    }

    #[test]
    fn test_builtin_stages() {
        let registry = default_registry().unwrap();
        let stage = |id: &str| registry.metadata(id).unwrap().stage;
        assert_eq!(stage(ids::QUERY_TRANSFORMATION), TechniqueStage::QueryTransform);
        assert_eq!(stage(ids::HYDE), TechniqueStage::QueryTransform);
        assert_eq!(stage(ids::VECTOR_RETRIEVAL), TechniqueStage::Retrieval);
        assert_eq!(stage(ids::FUSION_RETRIEVAL), TechniqueStage::Retrieval);
        assert_eq!(stage(ids::RERANKING), TechniqueStage::Reranking);
        assert_eq!(stage(ids::CONTEXTUAL_COMPRESSION), TechniqueStage::Compression);
    }

    #[test]
    fn test_builtins_are_singletons() {
        let registry = default_registry().unwrap();
        let a = registry.get(ids::VECTOR_RETRIEVAL).unwrap();
        let b = registry.get(ids::VECTOR_RETRIEVAL).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_llm_requirements() {
        let registry = default_registry().unwrap();
        assert!(registry.metadata(ids::QUERY_TRANSFORMATION).unwrap().requires_llm);
        assert!(registry.metadata(ids::HYDE).unwrap().requires_llm);
        assert!(!registry.metadata(ids::VECTOR_RETRIEVAL).unwrap().requires_llm);
        assert!(!registry.metadata(ids::CONTEXTUAL_COMPRESSION).unwrap().requires_llm);
    }
}
