//! Chunk embedding and retrieval (C2)

pub mod embedder;
pub mod index;

pub use embedder::{build_embedder, Embedder, FallbackEmbedder, OllamaEmbedder};
pub use index::{EmbeddingIndex, RetrievalFilter, RetrievedChunk};
