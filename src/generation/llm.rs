//! Generative backend client (C4)

use crate::cache::LlmCache;
use crate::config::GenerationConfig;
use crate::error::{CoreError, GenerationError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Text generation backend, abstracted so tests can swap in a fake
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
    done: bool,
}

/// Ollama-compatible chat client with optional response caching
pub struct OllamaLlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    cache: Option<Arc<LlmCache>>,
}

impl OllamaLlmClient {
    pub fn new(config: &GenerationConfig, cache: Option<Arc<LlmCache>>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.llm_timeout_s))
                .build()
                .unwrap_or_default(),
            base_url: config.ollama_url.clone(),
            model: config.text_model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.llm_timeout_s),
            cache,
        }
    }
}

#[async_trait]
impl LlmClient for OllamaLlmClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        if let Some(cache) = &self.cache {
            let key = LlmCache::compute_cache_key(prompt, &self.model, self.temperature, 0, Some(system));
            if let Ok(Some(hit)) = cache.get(&key).await {
                debug!("generation cache hit");
                return Ok(hit);
            }
        }

        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            },
        ];

        let request = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));

        let response = timeout(self.timeout, self.client.post(&url).json(&request).send())
            .await
            .map_err(|_| CoreError::Generation(GenerationError::Timeout))?
            .map_err(|e| CoreError::Generation(GenerationError::ServiceUnreachable(e.to_string())))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "generation backend returned error status");
            return Err(CoreError::Generation(GenerationError::ServiceUnreachable(
                response.status().to_string(),
            )));
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Generation(GenerationError::ServiceUnreachable(e.to_string())))?;

        if !parsed.done {
            return Err(CoreError::Generation(GenerationError::ServiceUnreachable(
                "incomplete response".to_string(),
            )));
        }

        let text = parsed.message.content.clone();

        if let Some(cache) = &self.cache {
            let key = LlmCache::compute_cache_key(prompt, &self.model, self.temperature, 0, Some(system));
            if let Err(e) = cache.set(key, text.clone(), self.model.clone(), self.temperature).await {
                warn!(error = %e, "failed to cache generation response");
            }
        }

        Ok(text)
    }
}
