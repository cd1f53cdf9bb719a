//! Text embedding backends (C2)

use crate::config::EmbeddingConfig;
use crate::error::{CoreError, IndexError, Result};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Produces a fixed-dimension vector representation of text
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Calls an Ollama-compatible embedding endpoint
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.embedding_timeout_s))
                .build()
                .unwrap_or_default(),
            base_url: config.ollama_url.clone(),
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
        }
    }
}

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&EmbedRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CoreError::Index(IndexError::Unavailable(format!(
                "embedding service returned status {}",
                response.status()
            ))));
        }

        let parsed: EmbedResponse = response.json().await?;
        if parsed.embedding.len() != self.dimension {
            return Err(CoreError::Index(IndexError::InvalidDimension {
                expected: self.dimension,
                actual: parsed.embedding.len(),
            }));
        }

        Ok(parsed.embedding)
    }
}

/// Deterministic pseudo-embedding used when no embedding service is configured.
///
/// Not a semantic embedding: it hashes words and character trigrams into a
/// fixed-size vector and L2-normalizes it, clustering lexically (not
/// semantically) similar text together.
pub struct FallbackEmbedder {
    dimension: usize,
}

impl FallbackEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn hash_str(s: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        hasher.finish()
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];

        let normalized: String = text
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c.is_whitespace() {
                    c.to_ascii_lowercase()
                } else {
                    ' '
                }
            })
            .collect();

        for word in normalized.split_whitespace() {
            let hash = Self::hash_str(word);
            let idx = (hash as usize) % self.dimension;
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            let magnitude = 1.0 + ((hash >> 16) & 0xFF) as f32 / 255.0;
            embedding[idx] += sign * magnitude;
        }

        let chars: Vec<char> = normalized.chars().collect();
        if chars.len() >= 3 {
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let hash = Self::hash_str(&trigram);
                let idx = (hash as usize) % self.dimension;
                let sign = if (hash >> 32) & 1 == 0 { 0.5 } else { -0.5 };
                embedding[idx] += sign;
            }
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in &mut embedding {
                *v /= magnitude;
            }
        }

        embedding
    }
}

#[async_trait]
impl Embedder for FallbackEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.generate(text))
    }
}

/// Build the configured embedder backend
pub fn build_embedder(config: &EmbeddingConfig) -> Box<dyn Embedder> {
    match config.backend.as_str() {
        "ollama" => Box::new(OllamaEmbedder::new(config)),
        _ => Box::new(FallbackEmbedder::new(config.embedding_dimension)),
    }
}
