//! Error types for the ragline pipeline core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering technique registration/validation, stage execution, and the
//! external collaborator boundaries (retrieval, reranking, generation,
//! pipeline resolution).

use uuid::Uuid;

use crate::registry::TechniqueStage;

/// Top-level error type for the ragline core library.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Technique error: {0}")]
    Technique(#[from] TechniqueError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Pipeline budget exceeded: {reason}")]
    BudgetExceeded { reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while assembling or executing a technique pipeline.
///
/// `UnknownTechnique`, `AlreadyRegistered`, `InvalidConfig`, and
/// `OrderingViolation` surface at build time, before any external call.
/// `Failed` is the runtime variant; it is caught inside the pipeline,
/// recorded in the per-technique metrics, and never aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum TechniqueError {
    #[error("Unknown technique: {id}")]
    UnknownTechnique { id: String },

    #[error("Technique already registered: {id}")]
    AlreadyRegistered { id: String },

    #[error("Invalid config for technique '{technique}': {key}: {reason}")]
    InvalidConfig {
        technique: String,
        key: String,
        reason: String,
    },

    #[error(
        "Technique '{technique}' (stage {stage}) cannot follow '{after}' (stage {after_stage})"
    )]
    OrderingViolation {
        technique: String,
        stage: TechniqueStage,
        after: String,
        after_stage: TechniqueStage,
    },

    #[error("Technique '{technique}' failed: {message}")]
    Failed { technique: String, message: String },
}

impl TechniqueError {
    pub fn failed(technique: impl Into<String>, message: impl ToString) -> Self {
        Self::Failed {
            technique: technique.into(),
            message: message.to_string(),
        }
    }
}

/// Errors raised by one of the six macro pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Pipeline resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Reranking failed: {0}")]
    Rerank(#[from] RerankError),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Query enhancement failed: {message}")]
    Enhancement { message: String },

    #[error("Reasoning failed: {message}")]
    Reasoning { message: String },
}

impl StageError {
    /// Whether this failure aborts the whole request.
    ///
    /// Resolution, retrieval, and generation failures leave nothing
    /// useful to answer from; enhancement, reranking, and reasoning
    /// degrade to the unenhanced pipeline state instead.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StageError::Resolution(_) | StageError::Retrieval(_) | StageError::Generation(_)
        )
    }
}

/// Errors from the vector retrieval collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetrievalError {
    #[error("Vector store request failed: {message}")]
    Backend { message: String },

    #[error("Collection not found: {collection}")]
    CollectionNotFound { collection: String },

    #[error("Retrieval timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Errors from the reranking collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RerankError {
    #[error("Reranker request failed: {message}")]
    Backend { message: String },

    #[error("Reranking timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Errors from the LLM collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("LLM request failed: {message}")]
    ApiRequest { message: String },

    #[error("LLM response parse error: {message}")]
    ResponseParse { message: String },

    #[error("LLM returned an empty completion")]
    EmptyCompletion,

    #[error("Generation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Errors from the pipeline resolution collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolutionError {
    #[error("No default pipeline configured for user {user_id}")]
    UserNotFound { user_id: Uuid },

    #[error("Pipeline resolution backend failed: {message}")]
    Backend { message: String },

    #[error("Resolution timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration parse error: {message}")]
    ParseError { message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::ParseError {
            message: err.to_string(),
        }
    }
}

/// A type alias for results using the top-level `PipelineError`.
pub type Result<T> = std::result::Result<T, PipelineError>;
