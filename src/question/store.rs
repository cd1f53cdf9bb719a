//! Question persistence and sampling (C5)

use crate::error::{CoreError, Result};
use crate::ingest::types::Topic;
use crate::question::types::{canonicalize, Question, QuestionFilter, QuestionMetadata, QuestionType};
use chrono::{DateTime, Utc};
use rand::seq::IteratorRandom;
use sqlx::{FromRow, Row, SqlitePool};
use std::collections::HashSet;
use std::str::FromStr;
use uuid::Uuid;

#[derive(FromRow)]
struct QuestionRow {
    id: String,
    document_id: String,
    chunk_ids: String,
    topic: String,
    grade_level: i64,
    difficulty: i64,
    question_type: String,
    body: String,
    options: String,
    correct_answer: String,
    alternatives: String,
    tolerance: Option<f64>,
    concepts: String,
    hints: String,
    explanation: String,
    created_at: String,
    metadata: String,
}

impl QuestionRow {
    fn into_question(self) -> Result<Question> {
        Ok(Question {
            id: Uuid::parse_str(&self.id).map_err(|e| CoreError::Validation(e.to_string()))?,
            document_id: Uuid::parse_str(&self.document_id)
                .map_err(|e| CoreError::Validation(e.to_string()))?,
            chunk_ids: serde_json::from_str::<Vec<String>>(&self.chunk_ids)?
                .into_iter()
                .filter_map(|s| Uuid::parse_str(&s).ok())
                .collect(),
            topic: Topic::from_str(&self.topic).map_err(CoreError::Validation)?,
            grade_level: self.grade_level as i32,
            difficulty: self.difficulty as i32,
            question_type: QuestionType::from_str(&self.question_type).map_err(CoreError::Validation)?,
            body: self.body,
            options: serde_json::from_str(&self.options)?,
            correct_answer: self.correct_answer,
            alternatives: serde_json::from_str(&self.alternatives)?,
            tolerance: self.tolerance,
            concepts: serde_json::from_str::<HashSet<String>>(&self.concepts)?,
            hints: serde_json::from_str(&self.hints)?,
            explanation: self.explanation,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .map_err(|e| CoreError::Validation(e.to_string()))?
                .with_timezone(&Utc),
            metadata: serde_json::from_str::<QuestionMetadata>(&self.metadata)?,
        })
    }
}

/// Persists generated questions and serves filtered/sampled reads
pub struct QuestionStore {
    pool: SqlitePool,
}

impl QuestionStore {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS questions (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_ids TEXT NOT NULL,
                topic TEXT NOT NULL,
                grade_level INTEGER NOT NULL,
                difficulty INTEGER NOT NULL,
                question_type TEXT NOT NULL,
                body TEXT NOT NULL,
                options TEXT NOT NULL,
                correct_answer TEXT NOT NULL,
                alternatives TEXT NOT NULL,
                tolerance REAL,
                concepts TEXT NOT NULL,
                hints TEXT NOT NULL,
                explanation TEXT NOT NULL,
                created_at TEXT NOT NULL,
                metadata TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_questions_grade_difficulty ON questions(grade_level, difficulty)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Validates §3 invariants before persisting: multiple_choice answers
    /// must match one option, and grade_level/topic must agree with the
    /// owning document (the caller passes the already-validated document's
    /// topic/grade_levels so this store stays free of cross-component lookups).
    pub async fn insert(&self, question: &Question) -> Result<Uuid> {
        if question.question_type == QuestionType::MultipleChoice
            && !question.options.iter().any(|o| canonicalize(o) == question.correct_answer)
        {
            return Err(CoreError::Validation(
                "multiple_choice correct_answer must equal one option".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO questions (
                id, document_id, chunk_ids, topic, grade_level, difficulty, question_type,
                body, options, correct_answer, alternatives, tolerance, concepts, hints,
                explanation, created_at, metadata
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(question.id.to_string())
        .bind(question.document_id.to_string())
        .bind(serde_json::to_string(
            &question.chunk_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        )?)
        .bind(question.topic.as_str())
        .bind(question.grade_level as i64)
        .bind(question.difficulty as i64)
        .bind(question.question_type.as_str())
        .bind(&question.body)
        .bind(serde_json::to_string(&question.options)?)
        .bind(&question.correct_answer)
        .bind(serde_json::to_string(&question.alternatives)?)
        .bind(question.tolerance)
        .bind(serde_json::to_string(&question.concepts)?)
        .bind(serde_json::to_string(&question.hints)?)
        .bind(&question.explanation)
        .bind(question.created_at.to_rfc3339())
        .bind(serde_json::to_string(&question.metadata)?)
        .execute(&self.pool)
        .await?;

        Ok(question.id)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Question>> {
        let row = sqlx::query_as::<_, QuestionRow>("SELECT * FROM questions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(QuestionRow::into_question).transpose()
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM questions WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_by_document(&self, document_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM questions WHERE document_id = ?1")
            .bind(document_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list(&self, filter: &QuestionFilter) -> Result<Vec<Question>> {
        let rows = sqlx::query_as::<_, QuestionRow>("SELECT * FROM questions")
            .fetch_all(&self.pool)
            .await?;

        let questions: Result<Vec<Question>> = rows.into_iter().map(QuestionRow::into_question).collect();
        let questions = questions?;

        Ok(questions.into_iter().filter(|q| matches_filter(q, filter)).collect())
    }

    /// Uniformly sample one question matching `filter` and not in `exclude_recent`.
    /// Widens difficulty by +/-1 up to two steps if the exclusion empties the
    /// set, then ignores the exclusion entirely, then gives up and returns None.
    pub async fn sample_one(
        &self,
        filter: &QuestionFilter,
        exclude_recent: &HashSet<Uuid>,
    ) -> Result<Option<Question>> {
        let base_difficulty = filter.difficulty;

        for widen in 0..=2 {
            let widened_filter = widen_difficulty(filter, base_difficulty, widen);
            let candidates = self.list(&widened_filter).await?;

            let filtered: Vec<&Question> =
                candidates.iter().filter(|q| !exclude_recent.contains(&q.id)).collect();

            if let Some(q) = sample_uniform(&filtered) {
                return Ok(Some(q.clone()));
            }
        }

        // Exclusion ignored entirely: try again against the fully-widened (+/-2) band,
        // not just the base difficulty, so a recently-answered d+/-1/2 question is still
        // a valid fallback instead of forcing NoQuestionsAvailable.
        let widest_filter = widen_difficulty(filter, base_difficulty, 2);
        let candidates = self.list(&widest_filter).await?;
        let refs: Vec<&Question> = candidates.iter().collect();
        Ok(sample_uniform(&refs).cloned())
    }
}

fn widen_difficulty(filter: &QuestionFilter, base: Option<i32>, steps: i32) -> QuestionFilter {
    if steps == 0 {
        return filter.clone();
    }
    let mut widened = filter.clone();
    if let Some(d) = base {
        widened.difficulty = None;
        widened.difficulty_range = Some(((d - steps).max(1), (d + steps).min(5)));
    }
    widened
}

fn sample_uniform<'a>(candidates: &[&'a Question]) -> Option<&'a Question> {
    let mut rng = rand::rng();
    candidates.iter().copied().choose(&mut rng)
}

fn matches_filter(question: &Question, filter: &QuestionFilter) -> bool {
    if let Some(topic) = filter.topic {
        if question.topic != topic {
            return false;
        }
    }
    if let Some(grade) = filter.grade_level {
        if question.grade_level != grade {
            return false;
        }
    }
    if let Some(difficulty) = filter.difficulty {
        if question.difficulty != difficulty {
            return false;
        }
    }
    if let Some((low, high)) = filter.difficulty_range {
        if question.difficulty < low || question.difficulty > high {
            return false;
        }
    }
    if let Some(document_id) = filter.document_id {
        if question.document_id != document_id {
            return false;
        }
    }
    if let Some(concept) = &filter.concept {
        if !question.concepts.contains(concept) {
            return false;
        }
    }
    true
}
