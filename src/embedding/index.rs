//! Persisted chunk vector store with cosine-similarity retrieval (C2)

use crate::config::EmbeddingConfig;
use crate::embedding::embedder::{build_embedder, Embedder};
use crate::error::{CoreError, IndexError, Result};
use crate::ingest::types::Topic;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

/// A scored retrieval hit
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub text: String,
    pub score: f32,
}

/// Optional conjunction of metadata filters applied during retrieval
#[derive(Debug, Clone, Default)]
pub struct RetrievalFilter {
    pub topic: Option<Topic>,
    pub grade_level: Option<i32>,
    pub document_id: Option<Uuid>,
}

/// SQLite-backed vector index, scanning and scoring entries by cosine similarity.
///
/// Acceptable for the corpus sizes this engine targets (single classroom
/// curricula); a production deployment could swap this for a dedicated
/// vector index behind the same `upsert`/`query`/`delete` contract.
pub struct EmbeddingIndex {
    pool: SqlitePool,
    embedder: Box<dyn Embedder>,
}

impl EmbeddingIndex {
    pub async fn new(pool: SqlitePool, config: &EmbeddingConfig) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_embeddings (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                topic TEXT NOT NULL,
                grade_levels TEXT NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunk_embeddings_document_id ON chunk_embeddings(document_id)",
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            embedder: build_embedder(config),
        })
    }

    fn serialize(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }

    /// Embed and store `text` for `chunk_id`, idempotent on chunk_id
    pub async fn upsert(
        &self,
        chunk_id: Uuid,
        document_id: Uuid,
        topic: Topic,
        grade_levels: &[i32],
        text: &str,
    ) -> Result<()> {
        let embedding = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| CoreError::Index(IndexError::Unavailable(e.to_string())))?;

        sqlx::query(
            r#"
            INSERT INTO chunk_embeddings (chunk_id, document_id, topic, grade_levels, text, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(chunk_id) DO UPDATE SET
                document_id = excluded.document_id,
                topic = excluded.topic,
                grade_levels = excluded.grade_levels,
                text = excluded.text,
                embedding = excluded.embedding
            "#,
        )
        .bind(chunk_id.to_string())
        .bind(document_id.to_string())
        .bind(topic.as_str())
        .bind(serde_json::to_string(grade_levels)?)
        .bind(text)
        .bind(Self::serialize(&embedding))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Top-k cosine retrieval against `query_text`, highest score first.
    /// Never raises: an empty index or a filter excluding everything yields
    /// an empty sequence.
    pub async fn query(
        &self,
        query_text: &str,
        k: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<RetrievedChunk>> {
        let query_embedding = match self.embedder.embed(query_text).await {
            Ok(v) => v,
            Err(_) => return Ok(Vec::new()),
        };

        let rows = sqlx::query("SELECT * FROM chunk_embeddings").fetch_all(&self.pool).await?;

        let mut scored = Vec::new();
        for row in rows {
            let topic_str: String = row.get("topic");
            let grade_levels_json: String = row.get("grade_levels");
            let document_id: String = row.get("document_id");

            if let Some(expected_topic) = filter.topic {
                if Topic::from_str(&topic_str).ok() != Some(expected_topic) {
                    continue;
                }
            }

            if let Some(expected_doc) = filter.document_id {
                if document_id != expected_doc.to_string() {
                    continue;
                }
            }

            if let Some(expected_grade) = filter.grade_level {
                let grade_levels: Vec<i32> =
                    serde_json::from_str(&grade_levels_json).unwrap_or_default();
                if !grade_levels.contains(&expected_grade) {
                    continue;
                }
            }

            let chunk_id: String = row.get("chunk_id");
            let text: String = row.get("text");
            let embedding_blob: Vec<u8> = row.get("embedding");
            let embedding = Self::deserialize(&embedding_blob);
            let score = Self::cosine_similarity(&query_embedding, &embedding);

            scored.push(RetrievedChunk {
                chunk_id: Uuid::parse_str(&chunk_id).map_err(|e| CoreError::Validation(e.to_string()))?,
                document_id: Uuid::parse_str(&document_id)
                    .map_err(|e| CoreError::Validation(e.to_string()))?,
                text,
                score,
            });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    pub async fn delete_by_document(&self, document_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM chunk_embeddings WHERE document_id = ?1")
            .bind(document_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn size(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM chunk_embeddings")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("count");
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_index() -> EmbeddingIndex {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        EmbeddingIndex::new(pool, &EmbeddingConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_query_returns_highest_first() {
        let index = test_index().await;
        let doc_id = Uuid::new_v4();

        index
            .upsert(Uuid::new_v4(), doc_id, Topic::Length, &[3], "a ruler measures length")
            .await
            .unwrap();
        index
            .upsert(Uuid::new_v4(), doc_id, Topic::Length, &[3], "completely unrelated content about weather")
            .await
            .unwrap();

        let results = index
            .query("ruler length measurement", 5, &RetrievalFilter::default())
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert!(results[0].score >= results.last().unwrap().score);
    }

    #[tokio::test]
    async fn test_query_empty_index_returns_empty() {
        let index = test_index().await;
        let results = index.query("anything", 5, &RetrievalFilter::default()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_query_filter_excludes_everything_returns_empty() {
        let index = test_index().await;
        index
            .upsert(Uuid::new_v4(), Uuid::new_v4(), Topic::Area, &[2], "area of a square")
            .await
            .unwrap();

        let filter = RetrievalFilter {
            topic: Some(Topic::Weight),
            ..Default::default()
        };
        let results = index.query("area", 5, &filter).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_idempotent_on_chunk_id() {
        let index = test_index().await;
        let chunk_id = Uuid::new_v4();
        let doc_id = Uuid::new_v4();

        index.upsert(chunk_id, doc_id, Topic::Capacity, &[1], "first version").await.unwrap();
        index.upsert(chunk_id, doc_id, Topic::Capacity, &[1], "second version").await.unwrap();

        assert_eq!(index.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_document_removes_entries() {
        let index = test_index().await;
        let doc_id = Uuid::new_v4();
        index.upsert(Uuid::new_v4(), doc_id, Topic::Weight, &[4], "weight content").await.unwrap();
        assert_eq!(index.size().await.unwrap(), 1);

        index.delete_by_document(doc_id).await.unwrap();
        assert_eq!(index.size().await.unwrap(), 0);
    }
}
