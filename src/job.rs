//! Generation job tracking (§9 design note: background generation modeled
//! as an explicit job entity rather than coupled to the request's lifetime)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Ready,
    Failed,
}

impl JobStatus {
    fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Ready => "ready",
            JobStatus::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "running" => JobStatus::Running,
            "ready" => JobStatus::Ready,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Queued,
        }
    }
}

/// Lifecycle record for a single `generate` invocation against a document.
/// This implementation drives the job synchronously within the request
/// (no background task queue), but still records transitions so a future
/// caller could poll status without depending on the request's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: Uuid,
    pub document_id: Uuid,
    pub status: JobStatus,
    pub requested_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(FromRow)]
struct JobRow {
    id: String,
    document_id: String,
    status: String,
    requested_at: String,
    completed_at: Option<String>,
    error: Option<String>,
}

impl JobRow {
    fn into_job(self) -> GenerationJob {
        GenerationJob {
            id: Uuid::parse_str(&self.id).unwrap_or_else(|_| Uuid::nil()),
            document_id: Uuid::parse_str(&self.document_id).unwrap_or_else(|_| Uuid::nil()),
            status: JobStatus::from_str(&self.status),
            requested_at: DateTime::parse_from_rfc3339(&self.requested_at)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            completed_at: self
                .completed_at
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|d| d.with_timezone(&Utc)),
            error: self.error,
        }
    }
}

pub struct GenerationJobStore {
    pool: SqlitePool,
}

impl GenerationJobStore {
    pub async fn new(pool: SqlitePool) -> sqlx::Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS generation_jobs (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                status TEXT NOT NULL,
                requested_at TEXT NOT NULL,
                completed_at TEXT,
                error TEXT
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub async fn create(&self, document_id: Uuid) -> sqlx::Result<GenerationJob> {
        let job = GenerationJob {
            id: Uuid::new_v4(),
            document_id,
            status: JobStatus::Queued,
            requested_at: Utc::now(),
            completed_at: None,
            error: None,
        };

        sqlx::query(
            "INSERT INTO generation_jobs (id, document_id, status, requested_at, completed_at, error) \
             VALUES (?1, ?2, ?3, ?4, NULL, NULL)",
        )
        .bind(job.id.to_string())
        .bind(job.document_id.to_string())
        .bind(job.status.as_str())
        .bind(job.requested_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(job)
    }

    async fn transition(&self, id: Uuid, status: JobStatus, error: Option<&str>) -> sqlx::Result<()> {
        let completed_at = matches!(status, JobStatus::Ready | JobStatus::Failed).then(|| Utc::now().to_rfc3339());

        sqlx::query(
            "UPDATE generation_jobs SET status = ?1, completed_at = ?2, error = ?3 WHERE id = ?4",
        )
        .bind(status.as_str())
        .bind(completed_at)
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_running(&self, id: Uuid) -> sqlx::Result<()> {
        self.transition(id, JobStatus::Running, None).await
    }

    pub async fn mark_ready(&self, id: Uuid) -> sqlx::Result<()> {
        self.transition(id, JobStatus::Ready, None).await
    }

    pub async fn mark_failed(&self, id: Uuid, error: &str) -> sqlx::Result<()> {
        self.transition(id, JobStatus::Failed, Some(error)).await
    }

    #[allow(dead_code)]
    pub async fn get(&self, id: Uuid) -> sqlx::Result<Option<GenerationJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM generation_jobs WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(JobRow::into_job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_job_lifecycle_transitions() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = GenerationJobStore::new(pool).await.unwrap();

        let job = store.create(Uuid::new_v4()).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        store.mark_running(job.id).await.unwrap();
        let fetched = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Running);

        store.mark_ready(job.id).await.unwrap();
        let fetched = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Ready);
        assert!(fetched.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_job_failure_records_error() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = GenerationJobStore::new(pool).await.unwrap();

        let job = store.create(Uuid::new_v4()).await.unwrap();
        store.mark_failed(job.id, "document not ready").await.unwrap();

        let fetched = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Failed);
        assert_eq!(fetched.error.as_deref(), Some("document not ready"));
    }
}
