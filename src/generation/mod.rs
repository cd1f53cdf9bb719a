//! Generative question synthesis with fallback templates (C4)

pub mod llm;
pub mod parser;
pub mod service;
pub mod templates;

pub use llm::{LlmClient, OllamaLlmClient};
pub use service::GenerationService;
