//! Adaptive measurement question engine
//!
//! Combines a retrieval-augmented question generator with a 1-parameter
//! logistic (Rasch) adaptive difficulty engine:
//! - Document ingestion, chunking, and embedding retrieval
//! - Prompted question synthesis with a persisted template fallback bank
//! - Per-learner ability tracking and next-question difficulty selection
//!
//! # Example
//!
//! ```rust,no_run
//! use measure_ade::config::EngineConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::default();
//!     config.validate()?;
//!     Ok(())
//! }
//! ```

pub mod ability;
pub mod api;
pub mod cache;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod job;
pub mod prompt;
pub mod question;
pub mod selector;

pub use ability::{AbilityRecord, AbilityStore, Analytics, AnswerRecord, ConceptMastery};
pub use cache::{LlmCache, LlmCacheConfig};
pub use config::EngineConfig;
pub use embedding::{Embedder, EmbeddingIndex, RetrievalFilter, RetrievedChunk};
pub use error::{CoreError, Result};
pub use generation::{GenerationService, LlmClient};
pub use ingest::{Document, DocumentMime, DocumentStatus, IngestService, Topic};
pub use job::{GenerationJob, GenerationJobStore, JobStatus};
pub use prompt::{MeasurementContext, PromptComposer};
pub use question::{Question, QuestionFilter, QuestionStore, QuestionType};
pub use selector::{QuestionSelector, SelectedQuestion};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with(char::is_numeric));
    }
}
