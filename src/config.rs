//! Configuration management for the adaptive question-delivery engine

use crate::cache::LlmCacheConfig;
use serde::{Deserialize, Serialize};

/// Top-level engine configuration, grouping each component's settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub ingest: IngestConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub adaptive: AdaptiveConfig,
    pub database_url: String,
}

/// Document ingestion settings (C1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,

    /// Minimum post-extraction text length
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_max_file_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_min_text_chars() -> usize {
    100
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_file_bytes: default_max_file_bytes(),
            min_text_chars: default_min_text_chars(),
        }
    }
}

/// Embedding index settings (C2)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "ollama" or "hash" (deterministic fallback, see embedding::FallbackEmbedder)
    #[serde(default = "default_embedder_backend")]
    pub backend: String,

    /// Base URL of the embedding service (when backend = "ollama")
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Model name used for embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding vector dimension
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Default top-k for retrieval
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: usize,

    /// Request timeout for the embedding service
    #[serde(default = "default_embedding_timeout_s")]
    pub embedding_timeout_s: u64,
}

fn default_embedder_backend() -> String {
    "hash".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_embedding_dimension() -> usize {
    384
}
fn default_retrieval_k() -> usize {
    5
}
fn default_embedding_timeout_s() -> u64 {
    10
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedder_backend(),
            ollama_url: default_ollama_url(),
            embedding_model: default_embedding_model(),
            embedding_dimension: default_embedding_dimension(),
            retrieval_k: default_retrieval_k(),
            embedding_timeout_s: default_embedding_timeout_s(),
        }
    }
}

/// Question generation settings (C3 + C4)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Ollama (or Ollama-compatible) server URL used for text generation
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Text generation model
    #[serde(default = "default_text_model")]
    pub text_model: String,

    /// Maximum characters of retrieved context concatenated into a prompt
    #[serde(default = "default_retrieval_context_chars")]
    pub retrieval_context_chars: usize,

    /// Hard timeout for the generation call before falling back to templates
    #[serde(default = "default_llm_timeout_s")]
    pub llm_timeout_s: u64,

    /// Generation sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Response cache configuration
    #[serde(default)]
    pub cache: LlmCacheConfig,
}

fn default_text_model() -> String {
    "llama3.2".to_string()
}
fn default_retrieval_context_chars() -> usize {
    1500
}
fn default_llm_timeout_s() -> u64 {
    30
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            text_model: default_text_model(),
            retrieval_context_chars: default_retrieval_context_chars(),
            llm_timeout_s: default_llm_timeout_s(),
            temperature: default_temperature(),
            cache: LlmCacheConfig::default(),
        }
    }
}

/// Adaptive difficulty engine settings (C7, C8)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    /// Learning rate (η) applied to each ability update
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Minimum difficulty level
    #[serde(default = "default_min_difficulty")]
    pub min_difficulty: i32,

    /// Maximum difficulty level
    #[serde(default = "default_max_difficulty")]
    pub max_difficulty: i32,

    /// Absolute clamp applied to ability (θ)
    #[serde(default = "default_ability_clamp")]
    pub ability_clamp: f64,

    /// Number of recent answers excluded from resampling
    #[serde(default = "default_avoid_recent_k")]
    pub avoid_recent_k: usize,

    /// Reported-only target success rate, used for analytics framing
    #[serde(default = "default_target_success_rate")]
    pub target_success_rate: f64,

    /// Timeout for store calls before a request fails
    #[serde(default = "default_store_timeout_s")]
    pub store_timeout_s: u64,
}

fn default_learning_rate() -> f64 {
    0.3
}
fn default_min_difficulty() -> i32 {
    1
}
fn default_max_difficulty() -> i32 {
    5
}
fn default_ability_clamp() -> f64 {
    3.0
}
fn default_avoid_recent_k() -> usize {
    10
}
fn default_target_success_rate() -> f64 {
    0.7
}
fn default_store_timeout_s() -> u64 {
    5
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            min_difficulty: default_min_difficulty(),
            max_difficulty: default_max_difficulty(),
            ability_clamp: default_ability_clamp(),
            avoid_recent_k: default_avoid_recent_k(),
            target_success_rate: default_target_success_rate(),
            store_timeout_s: default_store_timeout_s(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ingest: IngestConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            adaptive: AdaptiveConfig::default(),
            database_url: "sqlite:ade.db".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML, JSON, or YAML file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let config = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yml::from_str(&content)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string(self)?,
            Some("yaml") | Some("yml") => serde_yml::to_string(self)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration, catching obviously inconsistent values before startup
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(anyhow::anyhow!(
                "chunk_overlap must be smaller than chunk_size"
            ));
        }

        if self.embedding.embedding_dimension == 0 {
            return Err(anyhow::anyhow!("embedding_dimension must be greater than 0"));
        }

        if self.adaptive.min_difficulty < 1 || self.adaptive.max_difficulty < self.adaptive.min_difficulty {
            return Err(anyhow::anyhow!(
                "min_difficulty must be >= 1 and <= max_difficulty"
            ));
        }

        if self.adaptive.ability_clamp <= 0.0 {
            return Err(anyhow::anyhow!("ability_clamp must be positive"));
        }

        if self.adaptive.learning_rate <= 0.0 {
            return Err(anyhow::anyhow!("learning_rate must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ingest.chunk_size, 1000);
        assert_eq!(config.ingest.chunk_overlap, 200);
        assert_eq!(config.adaptive.min_difficulty, 1);
        assert_eq!(config.adaptive.max_difficulty, 5);
    }

    #[test]
    fn test_invalid_chunk_overlap_rejected() {
        let mut config = EngineConfig::default();
        config.ingest.chunk_overlap = config.ingest.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_difficulty_bounds_rejected() {
        let mut config = EngineConfig::default();
        config.adaptive.min_difficulty = 5;
        config.adaptive.max_difficulty = 1;
        assert!(config.validate().is_err());
    }
}
