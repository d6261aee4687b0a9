//! # Ragline Core
//!
//! Core library for the ragline answer pipeline.
//! Provides the technique registry and pipeline builder, the six-stage
//! executor, chain-of-thought reasoning, configuration, and the
//! collaborator traits the engine is wired with.

pub mod artifacts;
pub mod builder;
pub mod collab;
pub mod config;
pub mod context;
pub mod cot;
pub mod engine;
pub mod error;
pub mod presets;
pub mod registry;
pub mod stages;
pub mod techniques;
pub mod types;

mod text;

// Re-export commonly used types at the crate root.
pub use artifacts::{AnswerArtifact, ArtifactGenerator, CitationsGenerator};
pub use builder::{TechniquePipeline, TechniquePipelineBuilder, TechniqueResult};
pub use collab::{
    Generation, LlmClient, MockLlmClient, MockPipelineResolver, MockReranker, MockRetriever,
    PipelineResolver, Reranker, Retriever,
};
pub use config::{load_config, EngineConfig};
pub use context::{RequestIdentity, SearchContext, TechniqueContext};
pub use cot::{ChainOfThoughtOutput, ChainOfThoughtService, ReasoningStep};
pub use engine::AnswerEngine;
pub use error::{PipelineError, Result, StageError, TechniqueError};
pub use registry::{
    Technique, TechniqueMetadata, TechniqueOutput, TechniqueRegistry, TechniqueStage,
};
pub use stages::PipelineExecutor;
pub use types::{
    DocumentMetadata, PipelineConfig, QueryResult, SearchRequest, SearchResponse, TechniqueConfig,
    TechniqueMetrics, TechniquePreset, TokenUsage,
};
