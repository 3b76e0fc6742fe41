//! Configuration types for Pulse.
//!
//! `PulseConfig` represents the top-level `config.toml`. Every field has a
//! default so an empty (or missing) file yields a working configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Top-level configuration, loaded from `{data_dir}/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

/// Budgets, thresholds and TTLs for the memory subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum context size in token-equivalent units.
    #[serde(default = "default_token_budget")]
    pub token_budget: u32,
    /// Fraction of the budget that triggers trimming.
    #[serde(default = "default_trim_threshold")]
    pub trim_threshold: f64,
    #[serde(default = "default_min_messages_kept")]
    pub min_messages_kept: usize,
    /// How many short-term messages to load before trimming.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_procedural_threshold")]
    pub procedural_success_threshold: f64,
    #[serde(default = "default_embedding_cache_ttl")]
    pub embedding_cache_ttl_secs: u64,
    #[serde(default = "default_short_term_ttl")]
    pub short_term_ttl_secs: u64,
    /// Episodic/procedural record TTL. `None` = never expire.
    #[serde(default)]
    pub record_ttl_secs: Option<u64>,
    /// Minimum cosine similarity for a search hit.
    #[serde(default = "default_similarity_floor")]
    pub similarity_floor: f32,
    #[serde(default = "default_episodic_top_k")]
    pub episodic_top_k: usize,
    #[serde(default = "default_procedural_top_k")]
    pub procedural_top_k: usize,
}

fn default_token_budget() -> u32 {
    8_000
}

fn default_trim_threshold() -> f64 {
    0.8
}

fn default_min_messages_kept() -> usize {
    4
}

fn default_history_limit() -> usize {
    50
}

fn default_procedural_threshold() -> f64 {
    0.7
}

fn default_embedding_cache_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_short_term_ttl() -> u64 {
    30 * 24 * 60 * 60
}

fn default_similarity_floor() -> f32 {
    0.25
}

fn default_episodic_top_k() -> usize {
    5
}

fn default_procedural_top_k() -> usize {
    3
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            trim_threshold: default_trim_threshold(),
            min_messages_kept: default_min_messages_kept(),
            history_limit: default_history_limit(),
            procedural_success_threshold: default_procedural_threshold(),
            embedding_cache_ttl_secs: default_embedding_cache_ttl(),
            short_term_ttl_secs: default_short_term_ttl(),
            record_ttl_secs: None,
            similarity_floor: default_similarity_floor(),
            episodic_top_k: default_episodic_top_k(),
            procedural_top_k: default_procedural_top_k(),
        }
    }
}

/// Which assistant variant runs the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantVariant {
    /// Plain tool-calling loop: no router, no memory capabilities, no write-back.
    Memoryless,
    /// Router + memory capabilities + post-turn write-back.
    Memory,
}

impl fmt::Display for AssistantVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssistantVariant::Memoryless => write!(f, "memoryless"),
            AssistantVariant::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for AssistantVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memoryless" => Ok(AssistantVariant::Memoryless),
            "memory" => Ok(AssistantVariant::Memory),
            other => Err(format!("invalid assistant variant: '{other}'")),
        }
    }
}

/// Orchestrator loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_variant")]
    pub variant: AssistantVariant,
    /// Model-call bound for the memoryless loop.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Model-call bound for the memory-augmented loop.
    #[serde(default = "default_memory_max_iterations")]
    pub memory_max_iterations: u32,
    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_variant() -> AssistantVariant {
    AssistantVariant::Memory
}

fn default_max_iterations() -> u32 {
    8
}

fn default_memory_max_iterations() -> u32 {
    12
}

fn default_model_timeout() -> u64 {
    60
}

fn default_tool_timeout() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f64 {
    0.2
}

impl AgentConfig {
    /// The model-call bound that applies to `variant`.
    pub fn iteration_limit(&self, variant: AssistantVariant) -> u32 {
        match variant {
            AssistantVariant::Memoryless => self.max_iterations,
            AssistantVariant::Memory => self.memory_max_iterations,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            variant: default_variant(),
            max_iterations: default_max_iterations(),
            memory_max_iterations: default_memory_max_iterations(),
            model_timeout_secs: default_model_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_name")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_model_key_env")]
    pub api_key_env: String,
}

fn default_model_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_model_name() -> String {
    "llama3.1".to_string()
}

fn default_model_key_env() -> String {
    "PULSE_MODEL_API_KEY".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_base_url(),
            model: default_model_name(),
            api_key_env: default_model_key_env(),
        }
    }
}

/// OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_model_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_embedding_dimension() -> usize {
    768
}

fn default_embedding_key_env() -> String {
    "PULSE_EMBEDDING_API_KEY".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_base_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            api_key_env: default_embedding_key_env(),
        }
    }
}

/// External read-only health data service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_base_url")]
    pub base_url: String,
}

fn default_health_base_url() -> String {
    "http://localhost:8000/api/health".to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            base_url: default_health_base_url(),
        }
    }
}
