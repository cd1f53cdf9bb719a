//! C1: document ingestion orchestration

use crate::config::IngestConfig;
use crate::embedding::EmbeddingIndex;
use crate::error::{CoreError, IngestError, Result};
use crate::ingest::chunker::ContentChunker;
use crate::ingest::extractor::extract_text;
use crate::ingest::store::DocumentStore;
use crate::ingest::types::{Document, DocumentMime, DocumentStatus, IngestOutcome, Topic};
use std::sync::Arc;
use uuid::Uuid;

/// Drives a document through extraction, chunking, storage, and embedding
pub struct IngestService {
    store: Arc<DocumentStore>,
    index: Arc<EmbeddingIndex>,
    chunker: ContentChunker,
    min_text_chars: usize,
}

impl IngestService {
    pub fn new(store: Arc<DocumentStore>, index: Arc<EmbeddingIndex>, config: &IngestConfig) -> Self {
        Self {
            store,
            index,
            chunker: ContentChunker::new(config),
            min_text_chars: config.min_text_chars,
        }
    }

    /// Register a new document and return it in `pending` status
    pub async fn register(
        &self,
        title: String,
        topic: Topic,
        grade_levels: Vec<i32>,
        uploader: String,
    ) -> Result<Document> {
        let doc = Document::new(title, topic, grade_levels, uploader);
        self.store.insert_document(&doc).await?;
        Ok(doc)
    }

    /// Run the full C1 ingest pipeline against already-uploaded file bytes.
    ///
    /// Unsupported formats and extraction failures are fatal: the document
    /// transitions to `failed` and the error propagates. A document whose
    /// extracted text falls below the configured minimum is also failed,
    /// rather than silently stored with zero chunks.
    pub async fn ingest(
        &self,
        document: &Document,
        file_bytes: &[u8],
        mime_hint: &str,
        filename_hint: Option<&str>,
    ) -> Result<IngestOutcome> {
        self.store
            .set_status(document.id, DocumentStatus::Processing, 0)
            .await?;

        match self.run_pipeline(document, file_bytes, mime_hint, filename_hint).await {
            Ok(chunk_count) => {
                self.store
                    .set_status(document.id, DocumentStatus::Ready, chunk_count)
                    .await?;
                Ok(IngestOutcome {
                    status: DocumentStatus::Ready,
                    chunk_count,
                })
            }
            Err(err) => {
                self.store
                    .set_status(document.id, DocumentStatus::Failed, 0)
                    .await?;
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        document: &Document,
        file_bytes: &[u8],
        mime_hint: &str,
        filename_hint: Option<&str>,
    ) -> Result<usize> {
        let mime = DocumentMime::from_mime_str(mime_hint)
            .or_else(|| filename_hint.and_then(DocumentMime::from_extension_hint))
            .ok_or_else(|| {
                CoreError::Ingest(IngestError::UnsupportedFormat(
                    mime_hint.to_string(),
                ))
            })?;

        let text = extract_text(file_bytes, mime)?;

        if text.chars().count() < self.min_text_chars {
            return Err(CoreError::Ingest(IngestError::ContentTooShort(
                text.chars().count(),
                self.min_text_chars,
            )));
        }

        let chunks = self.chunker.chunk_text(&text, document.id);
        self.store.insert_chunks(&chunks).await?;

        for chunk in &chunks {
            self.index
                .upsert(
                    chunk.id,
                    document.id,
                    document.topic,
                    &document.grade_levels,
                    &chunk.text,
                )
                .await?;
        }

        Ok(chunks.len())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Document>> {
        self.store.get_document(id).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.index.delete_by_document(id).await?;
        self.store.delete_document(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use sqlx::SqlitePool;

    async fn service() -> IngestService {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = Arc::new(DocumentStore::new(pool.clone()).await.unwrap());
        let index = Arc::new(
            EmbeddingIndex::new(pool, &EmbeddingConfig::default())
                .await
                .unwrap(),
        );
        IngestService::new(store, index, &IngestConfig::default())
    }

    #[tokio::test]
    async fn test_ingest_plain_text_succeeds() {
        let svc = service().await;
        let doc = svc
            .register(
                "Rulers".into(),
                Topic::Length,
                vec![3],
                "t1".into(),
            )
            .await
            .unwrap();

        let body = "A ruler measures length in centimeters and inches. ".repeat(5);
        let outcome = svc
            .ingest(&doc, body.as_bytes(), "text/plain", None)
            .await
            .unwrap();

        assert_eq!(outcome.status, DocumentStatus::Ready);
        assert!(outcome.chunk_count >= 1);

        let fetched = svc.get(doc.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, DocumentStatus::Ready);
    }

    #[tokio::test]
    async fn test_ingest_too_short_fails_document() {
        let svc = service().await;
        let doc = svc
            .register("Tiny".into(), Topic::Area, vec![2], "t2".into())
            .await
            .unwrap();

        let result = svc.ingest(&doc, b"too short", "text/plain", None).await;
        assert!(result.is_err());

        let fetched = svc.get(doc.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, DocumentStatus::Failed);
    }

    #[tokio::test]
    async fn test_ingest_unsupported_format_fails() {
        let svc = service().await;
        let doc = svc
            .register("Mystery".into(), Topic::Weight, vec![4], "t3".into())
            .await
            .unwrap();

        let result = svc
            .ingest(&doc, b"whatever", "application/octet-stream", None)
            .await;
        assert!(matches!(
            result,
            Err(CoreError::Ingest(IngestError::UnsupportedFormat(_)))
        ));
    }

    #[tokio::test]
    async fn test_ingest_extension_hint_used_when_mime_unrecognized() {
        let svc = service().await;
        let doc = svc
            .register("Cups".into(), Topic::Capacity, vec![1], "t4".into())
            .await
            .unwrap();

        let body = "Measuring cups hold liquid volume in milliliters and liters. ".repeat(5);
        let outcome = svc
            .ingest(
                &doc,
                body.as_bytes(),
                "application/octet-stream",
                Some("notes.txt"),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, DocumentStatus::Ready);
    }
}
