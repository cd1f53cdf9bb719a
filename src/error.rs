//! Error handling for the adaptive question-delivery engine

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, CoreError>;

/// Top-level error type returned by every cross-component call
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("embedding index error: {0}")]
    Index(#[from] IndexError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no questions available for the requested filter")]
    NoQuestionsAvailable,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors from the document ingestor (C1)
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("content too short: {0} characters, minimum is {1}")]
    ContentTooShort(usize, usize),

    #[error("file too large: {0} bytes, maximum is {1}")]
    FileTooLarge(usize, usize),
}

/// Errors from the embedding index (C2)
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("embedding service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Errors from LLM invocation and candidate parsing (C4)
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generation service unreachable: {0}")]
    ServiceUnreachable(String),

    #[error("generation timed out")]
    Timeout,

    #[error("no valid candidates produced")]
    NoValidCandidates,
}

/// Errors from persistent stores (C5, C6)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("stale record: expected updated_at {expected}, found {actual}")]
    StaleRecord { expected: String, actual: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl CoreError {
    /// Whether the caller may usefully retry this operation (see spec §7)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Index(IndexError::Unavailable(_))
                | CoreError::Store(StoreError::Unavailable(_))
                | CoreError::Http(_)
        )
    }

    /// Category label for structured logging
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation",
            CoreError::Ingest(_) => "ingest",
            CoreError::Index(_) => "index",
            CoreError::Generation(_) => "generation",
            CoreError::Store(_) => "store",
            CoreError::NotFound(_) => "not_found",
            CoreError::NoQuestionsAvailable => "no_questions_available",
            CoreError::Conflict(_) => "conflict",
            CoreError::Database(_) => "database",
            CoreError::Io(_) => "io",
            CoreError::Serialization(_) => "serialization",
            CoreError::Http(_) => "http",
            CoreError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CoreError::Index(IndexError::Unavailable("down".into())).is_retryable());
        assert!(CoreError::Store(StoreError::Unavailable("down".into())).is_retryable());
        assert!(!CoreError::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn test_category() {
        assert_eq!(CoreError::NotFound("x".into()).category(), "not_found");
        assert_eq!(
            CoreError::Generation(GenerationError::Timeout).category(),
            "generation"
        );
    }
}
