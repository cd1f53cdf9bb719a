//! Persistence for documents and their chunks

use crate::error::{CoreError, Result};
use crate::ingest::types::{Chunk, Document, DocumentStatus, Topic};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

#[derive(FromRow)]
struct DocumentRow {
    id: String,
    title: String,
    topic: String,
    grade_levels: String,
    uploader: String,
    upload_time: String,
    status: String,
    chunk_count: i64,
}

impl DocumentRow {
    fn into_document(self) -> Result<Document> {
        Ok(Document {
            id: Uuid::parse_str(&self.id).map_err(|e| CoreError::Validation(e.to_string()))?,
            title: self.title,
            topic: Topic::from_str(&self.topic).map_err(CoreError::Validation)?,
            grade_levels: serde_json::from_str(&self.grade_levels)?,
            uploader: self.uploader,
            upload_time: DateTime::parse_from_rfc3339(&self.upload_time)
                .map_err(|e| CoreError::Validation(e.to_string()))?
                .with_timezone(&Utc),
            status: DocumentStatus::from_str(&self.status).map_err(CoreError::Validation)?,
            chunk_count: self.chunk_count as usize,
        })
    }
}

#[derive(FromRow)]
struct ChunkRow {
    id: String,
    document_id: String,
    sequence: i64,
    text: String,
    start_char: i64,
    end_char: i64,
}

impl ChunkRow {
    fn into_chunk(self) -> Result<Chunk> {
        Ok(Chunk {
            id: Uuid::parse_str(&self.id).map_err(|e| CoreError::Validation(e.to_string()))?,
            document_id: Uuid::parse_str(&self.document_id)
                .map_err(|e| CoreError::Validation(e.to_string()))?,
            sequence: self.sequence as usize,
            text: self.text,
            start_char: self.start_char as usize,
            end_char: self.end_char as usize,
        })
    }
}

/// SQLite-backed store for documents and chunks (C1 persistence surface)
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                topic TEXT NOT NULL,
                grade_levels TEXT NOT NULL,
                uploader TEXT NOT NULL,
                upload_time TEXT NOT NULL,
                status TEXT NOT NULL,
                chunk_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                text TEXT NOT NULL,
                start_char INTEGER NOT NULL,
                end_char INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, topic, grade_levels, uploader, upload_time, status, chunk_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(doc.id.to_string())
        .bind(&doc.title)
        .bind(doc.topic.as_str())
        .bind(serde_json::to_string(&doc.grade_levels)?)
        .bind(&doc.uploader)
        .bind(doc.upload_time.to_rfc3339())
        .bind(doc.status.as_str())
        .bind(doc.chunk_count as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(DocumentRow::into_document).transpose()
    }

    /// Update status and, when the ingest worker finishes, the chunk count.
    /// Only C1's ingest worker may mutate a Document after creation.
    pub async fn set_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        chunk_count: usize,
    ) -> Result<()> {
        sqlx::query("UPDATE documents SET status = ?1, chunk_count = ?2 WHERE id = ?3")
            .bind(status.as_str())
            .bind(chunk_count as i64)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, sequence, text, start_char, end_char)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(chunk.id.to_string())
            .bind(chunk.document_id.to_string())
            .bind(chunk.sequence as i64)
            .bind(&chunk.text)
            .bind(chunk.start_char as i64)
            .bind(chunk.end_char as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_chunks(&self, document_id: Uuid) -> Result<Vec<Chunk>> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            "SELECT * FROM chunks WHERE document_id = ?1 ORDER BY sequence ASC",
        )
        .bind(document_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChunkRow::into_chunk).collect()
    }

    /// Delete a document and its chunks. Cascading to questions is a
    /// caller-level policy decision (see spec §3 ownership summary), so this
    /// call never touches the questions table.
    pub async fn delete_document(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> DocumentStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        DocumentStore::new(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get_document() {
        let store = test_store().await;
        let doc = Document::new(
            "Measuring Cups".to_string(),
            Topic::Capacity,
            vec![2, 3],
            "teacher1".to_string(),
        );

        store.insert_document(&doc).await.unwrap();
        let fetched = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Measuring Cups");
        assert_eq!(fetched.status, DocumentStatus::Pending);
    }

    #[tokio::test]
    async fn test_set_status_transitions() {
        let store = test_store().await;
        let doc = Document::new(
            "Rulers".to_string(),
            Topic::Length,
            vec![1],
            "teacher2".to_string(),
        );
        store.insert_document(&doc).await.unwrap();

        store
            .set_status(doc.id, DocumentStatus::Ready, 12)
            .await
            .unwrap();

        let fetched = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, DocumentStatus::Ready);
        assert_eq!(fetched.chunk_count, 12);
    }

    #[tokio::test]
    async fn test_insert_and_list_chunks_ordered() {
        let store = test_store().await;
        let doc_id = Uuid::new_v4();
        let chunks = vec![
            Chunk {
                id: Uuid::new_v4(),
                document_id: doc_id,
                sequence: 1,
                text: "second".into(),
                start_char: 10,
                end_char: 20,
            },
            Chunk {
                id: Uuid::new_v4(),
                document_id: doc_id,
                sequence: 0,
                text: "first".into(),
                start_char: 0,
                end_char: 10,
            },
        ];
        store.insert_chunks(&chunks).await.unwrap();

        let fetched = store.list_chunks(doc_id).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].sequence, 0);
        assert_eq!(fetched[1].sequence, 1);
    }

    #[tokio::test]
    async fn test_delete_document_cascades_chunks() {
        let store = test_store().await;
        let doc = Document::new(
            "Scales".to_string(),
            Topic::Weight,
            vec![4],
            "teacher3".to_string(),
        );
        store.insert_document(&doc).await.unwrap();

        let chunk = Chunk {
            id: Uuid::new_v4(),
            document_id: doc.id,
            sequence: 0,
            text: "content".into(),
            start_char: 0,
            end_char: 7,
        };
        store.insert_chunks(&[chunk]).await.unwrap();

        store.delete_document(doc.id).await.unwrap();

        assert!(store.get_document(doc.id).await.unwrap().is_none());
        assert!(store.list_chunks(doc.id).await.unwrap().is_empty());
    }
}
