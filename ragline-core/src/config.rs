//! Engine configuration, loaded from layered sources.
//!
//! Priority (highest to lowest): explicit overrides, environment variables
//! prefixed with `RAGLINE_` (nested with `__`, e.g. `RAGLINE_COT__MAX_RETRIES`),
//! a TOML file, built-in defaults.

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration for the answer engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub enhancement: EnhancementConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub cot: CotConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
}

/// Retrieval defaults applied when a technique config does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks fetched per retrieval call.
    pub default_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { default_top_k: 10 }
    }
}

/// Query-enhancement stage behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementConfig {
    /// Queries shorter than this many words skip enhancement entirely.
    pub min_query_words: usize,
    /// Whether to run a direct LLM rewrite when no query-transform
    /// technique is configured.
    pub direct_rewrite: bool,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            min_query_words: 5,
            direct_rewrite: true,
        }
    }
}

/// Final answer generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    /// How many top chunks are quoted as sources in the prompt.
    pub max_context_chunks: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.2,
            max_context_chunks: 5,
        }
    }
}

/// Chain-of-thought reasoning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CotConfig {
    /// A reasoning step below this score is retried.
    pub quality_threshold: f64,
    /// Retries per sub-question after the first attempt.
    pub max_retries: u32,
    /// Maximum number of sub-questions per decomposition.
    pub max_depth: usize,
    /// Chunks retrieved per sub-question.
    pub retrieval_top_k: usize,
    /// Token limit for each reasoning step.
    pub step_max_tokens: u32,
}

impl Default for CotConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 0.6,
            max_retries: 3,
            max_depth: 3,
            retrieval_top_k: 5,
            step_max_tokens: 512,
        }
    }
}

/// Deadlines for the external collaborators, in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub llm_secs: u64,
    pub retrieval_secs: u64,
    pub rerank_secs: u64,
    pub resolution_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_secs: 60,
            retrieval_secs: 30,
            rerank_secs: 30,
            resolution_secs: 10,
        }
    }
}

/// Pre-flight limits on the estimated cost of a built pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Maximum summed estimated latency in milliseconds (0 = unlimited).
    pub max_estimated_latency_ms: u64,
    /// Maximum summed token cost multiplier (0.0 = unlimited).
    pub max_token_multiplier: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_estimated_latency_ms: 0,
            max_token_multiplier: 0.0,
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `RAGLINE_`)
/// 3. TOML file (`ragline.toml` or the given path)
/// 4. Built-in defaults
pub fn load_config(
    path: Option<&Path>,
    overrides: Option<&EngineConfig>,
) -> Result<EngineConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));

    let file = path.unwrap_or_else(|| Path::new("ragline.toml"));
    if file.exists() {
        figment = figment.merge(Toml::file(file));
    }

    figment = figment.merge(Env::prefixed("RAGLINE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(ConfigError::from)
}
