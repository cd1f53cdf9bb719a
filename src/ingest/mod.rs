//! Document ingestion: extraction, chunking, and persistence (C1)

pub mod chunker;
pub mod extractor;
pub mod service;
pub mod store;
pub mod types;

pub use service::IngestService;
pub use store::DocumentStore;
pub use types::{Chunk, Document, DocumentMime, DocumentStatus, IngestOutcome, Topic};
