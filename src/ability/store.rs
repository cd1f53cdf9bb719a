//! Ability and answer-log persistence, serialized per (learner_id, unit_id) (C6)

use crate::ability::types::{AbilityRecord, Analytics, AnswerRecord};
use crate::error::{CoreError, Result, StoreError};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(FromRow)]
struct AbilityRow {
    learner_id: String,
    unit_id: String,
    ability: f64,
    current_difficulty: i64,
    total_answered: i64,
    total_correct: i64,
    concepts_mastered: String,
    created_at: String,
    updated_at: String,
}

impl AbilityRow {
    fn into_record(self) -> Result<AbilityRecord> {
        Ok(AbilityRecord {
            learner_id: self.learner_id,
            unit_id: self.unit_id,
            ability: self.ability,
            current_difficulty: self.current_difficulty as i32,
            total_answered: self.total_answered as u32,
            total_correct: self.total_correct as u32,
            concepts_mastered: serde_json::from_str(&self.concepts_mastered)?,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .map_err(|e| CoreError::Validation(e.to_string()))?
                .with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&self.updated_at)
                .map_err(|e| CoreError::Validation(e.to_string()))?
                .with_timezone(&Utc),
        })
    }
}

/// SQLite-backed store for AbilityRecord and the append-only AnswerRecord log.
///
/// `submit_answer`-style updates must serialize per (learner_id, unit_id) per
/// the concurrency model; a per-key async mutex guards the read-modify-write
/// around the optimistic `updated_at` compare-and-swap so concurrent callers
/// never lose an update.
pub struct AbilityStore {
    pool: SqlitePool,
    key_locks: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
}

fn lock_key(learner_id: &str, unit_id: &str) -> String {
    format!("{learner_id}:{unit_id}")
}

impl AbilityStore {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS student_ability (
                learner_id TEXT NOT NULL,
                unit_id TEXT NOT NULL,
                ability REAL NOT NULL,
                current_difficulty INTEGER NOT NULL,
                total_answered INTEGER NOT NULL,
                total_correct INTEGER NOT NULL,
                concepts_mastered TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (learner_id, unit_id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS student_answers (
                id TEXT PRIMARY KEY,
                learner_id TEXT NOT NULL,
                question_id TEXT NOT NULL,
                unit_id TEXT NOT NULL,
                answer_given TEXT NOT NULL,
                is_correct INTEGER NOT NULL,
                time_taken_ms INTEGER NOT NULL,
                difficulty_at_attempt INTEGER NOT NULL,
                ability_before REAL NOT NULL,
                ability_after REAL NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_answers_learner_unit_ts ON student_answers(learner_id, unit_id, timestamp DESC)",
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            key_locks: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    async fn lock_for(&self, learner_id: &str, unit_id: &str) -> Arc<Mutex<()>> {
        let key = lock_key(learner_id, unit_id);
        if let Some(lock) = self.key_locks.read().await.get(&key) {
            return lock.clone();
        }
        let mut locks = self.key_locks.write().await;
        locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    async fn fetch(&self, learner_id: &str, unit_id: &str) -> Result<Option<AbilityRecord>> {
        let row = sqlx::query_as::<_, AbilityRow>(
            "SELECT * FROM student_ability WHERE learner_id = ?1 AND unit_id = ?2",
        )
        .bind(learner_id)
        .bind(unit_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AbilityRow::into_record).transpose()
    }

    /// On first call, inserts with ability=0.0 and the given initial difficulty.
    /// Subsequent calls return the persisted record unchanged.
    pub async fn get_or_init(
        &self,
        learner_id: &str,
        unit_id: &str,
        initial_difficulty: i32,
    ) -> Result<AbilityRecord> {
        let guard = self.lock_for(learner_id, unit_id).await;
        let _permit = guard.lock().await;

        if let Some(existing) = self.fetch(learner_id, unit_id).await? {
            return Ok(existing);
        }

        let record = AbilityRecord::new(learner_id.to_string(), unit_id.to_string(), initial_difficulty);
        self.insert(&record).await?;
        Ok(record)
    }

    async fn insert(&self, record: &AbilityRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO student_ability (
                learner_id, unit_id, ability, current_difficulty, total_answered,
                total_correct, concepts_mastered, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&record.learner_id)
        .bind(&record.unit_id)
        .bind(record.ability)
        .bind(record.current_difficulty as i64)
        .bind(record.total_answered as i64)
        .bind(record.total_correct as i64)
        .bind(serde_json::to_string(&record.concepts_mastered)?)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomic replace, compare-and-swap on `updated_at`. `expected_updated_at`
    /// must match the currently persisted value or the call fails with
    /// `StaleRecord` and the caller must re-read and retry.
    pub async fn update(
        &self,
        mut record: AbilityRecord,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<AbilityRecord> {
        let guard = self.lock_for(&record.learner_id, &record.unit_id).await;
        let _permit = guard.lock().await;

        let current = self
            .fetch(&record.learner_id, &record.unit_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("{}:{}", record.learner_id, record.unit_id)))?;

        if current.updated_at != expected_updated_at {
            return Err(CoreError::Store(StoreError::StaleRecord {
                expected: expected_updated_at.to_rfc3339(),
                actual: current.updated_at.to_rfc3339(),
            }));
        }

        record.updated_at = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE student_ability SET
                ability = ?1, current_difficulty = ?2, total_answered = ?3,
                total_correct = ?4, concepts_mastered = ?5, updated_at = ?6
            WHERE learner_id = ?7 AND unit_id = ?8
            "#,
        )
        .bind(record.ability)
        .bind(record.current_difficulty as i64)
        .bind(record.total_answered as i64)
        .bind(record.total_correct as i64)
        .bind(serde_json::to_string(&record.concepts_mastered)?)
        .bind(record.updated_at.to_rfc3339())
        .bind(&record.learner_id)
        .bind(&record.unit_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!(
                "{}:{}",
                record.learner_id, record.unit_id
            )));
        }

        Ok(record)
    }

    pub async fn append_answer(&self, answer: &AnswerRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO student_answers (
                id, learner_id, question_id, unit_id, answer_given, is_correct,
                time_taken_ms, difficulty_at_attempt, ability_before, ability_after, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(answer.id.to_string())
        .bind(&answer.learner_id)
        .bind(answer.question_id.to_string())
        .bind(&answer.unit_id)
        .bind(&answer.answer_given)
        .bind(answer.is_correct)
        .bind(answer.time_taken_ms as i64)
        .bind(answer.difficulty_at_attempt as i64)
        .bind(answer.ability_before)
        .bind(answer.ability_after)
        .bind(answer.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent K answer question_ids for this learner+unit, newest first
    pub async fn recent_question_ids(
        &self,
        learner_id: &str,
        unit_id: &str,
        k: usize,
    ) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT question_id FROM student_answers WHERE learner_id = ?1 AND unit_id = ?2 \
             ORDER BY timestamp DESC LIMIT ?3",
        )
        .bind(learner_id)
        .bind(unit_id)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let id: String = row.get("question_id");
                Uuid::parse_str(&id).map_err(|e| CoreError::Validation(e.to_string()))
            })
            .collect()
    }

    pub async fn analytics(&self, learner_id: &str, unit_id: &str) -> Result<Analytics> {
        let record = self
            .fetch(learner_id, unit_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("{learner_id}:{unit_id}")))?;

        let accuracy = if record.total_answered > 0 {
            record.total_correct as f64 / record.total_answered as f64
        } else {
            0.0
        };

        Ok(Analytics {
            total: record.total_answered,
            correct: record.total_correct,
            accuracy,
            ability: record.ability,
            difficulty: record.current_difficulty,
            concepts_mastered: record.concepts_mastered,
        })
    }
}
