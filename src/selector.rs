//! Question Selector (C8)
//!
//! Composes the ability store (C6), the IRT target-difficulty rule (C7),
//! and question sampling (C5) into the single `next_question` read path.
//! `sample_one` already performs the ±1/±2 widening and exclusion-dropping
//! described in §4.5; this module is only responsible for deriving the
//! base filter and the avoid-recent set from the persisted ability state.

use crate::ability::irt;
use crate::ability::AbilityStore;
use crate::config::AdaptiveConfig;
use crate::error::{CoreError, Result};
use crate::ingest::types::Topic;
use crate::question::{Question, QuestionFilter, QuestionStore};
use std::sync::Arc;

/// A selected question plus the adaptive state it was chosen against
#[derive(Debug, Clone)]
pub struct SelectedQuestion {
    pub question: Question,
    pub ability: f64,
    pub target_difficulty: i32,
}

/// Implements C8: given a learner/unit/grade, picks the next question
pub struct QuestionSelector {
    ability_store: Arc<AbilityStore>,
    question_store: Arc<QuestionStore>,
    min_difficulty: i32,
    max_difficulty: i32,
    avoid_recent_k: usize,
}

impl QuestionSelector {
    pub fn new(
        ability_store: Arc<AbilityStore>,
        question_store: Arc<QuestionStore>,
        config: &AdaptiveConfig,
    ) -> Self {
        Self {
            ability_store,
            question_store,
            min_difficulty: config.min_difficulty,
            max_difficulty: config.max_difficulty,
            avoid_recent_k: config.avoid_recent_k,
        }
    }

    /// Select the next question for `learner_id`/`unit_id` at `grade`.
    ///
    /// `topic` narrows the candidate set (a unit is conventionally one
    /// topic at one grade, but `unit_id` itself is opaque per §9 — the
    /// caller supplies topic explicitly rather than have this module
    /// parse it out of the key). `next_question` never mutates ability:
    /// it only reads the current record, initializing it lazily on first
    /// call, and reports `current_difficulty` for display purposes.
    pub async fn select(
        &self,
        learner_id: &str,
        unit_id: &str,
        grade: i32,
        topic: Option<Topic>,
    ) -> Result<SelectedQuestion> {
        let initial_difficulty = grade.clamp(self.min_difficulty, self.max_difficulty);
        let record = self
            .ability_store
            .get_or_init(learner_id, unit_id, initial_difficulty)
            .await?;

        let d_target = irt::target_difficulty(grade, record.ability, self.min_difficulty, self.max_difficulty);

        let recent = self
            .ability_store
            .recent_question_ids(learner_id, unit_id, self.avoid_recent_k)
            .await?
            .into_iter()
            .collect();

        let base_filter = QuestionFilter {
            topic,
            grade_level: Some(grade),
            difficulty: Some(d_target),
            ..Default::default()
        };

        let question = self
            .question_store
            .sample_one(&base_filter, &recent)
            .await?
            .ok_or(CoreError::NoQuestionsAvailable)?;

        Ok(SelectedQuestion {
            question,
            ability: record.ability,
            target_difficulty: d_target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdaptiveConfig;
    use crate::question::types::{QuestionMetadata, QuestionType};
    use chrono::Utc;
    use sqlx::SqlitePool;
    use uuid::Uuid;

    async fn setup() -> (Arc<AbilityStore>, Arc<QuestionStore>) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let ability = Arc::new(AbilityStore::new(pool.clone()).await.unwrap());
        let questions = Arc::new(QuestionStore::new(pool).await.unwrap());
        (ability, questions)
    }

    fn question(topic: Topic, grade: i32, difficulty: i32) -> Question {
        Question {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            chunk_ids: vec![],
            topic,
            grade_level: grade,
            difficulty,
            question_type: QuestionType::Numeric,
            body: "x".into(),
            options: vec![],
            correct_answer: "1".into(),
            alternatives: vec![],
            tolerance: None,
            concepts: Default::default(),
            hints: vec![],
            explanation: "e".into(),
            created_at: Utc::now(),
            metadata: QuestionMetadata::default(),
        }
    }

    #[tokio::test]
    async fn test_initial_call_targets_grade_difficulty() {
        let (ability, questions) = setup().await;
        questions.insert(&question(Topic::Length, 1, 1)).await.unwrap();

        let selector = QuestionSelector::new(ability, questions, &AdaptiveConfig::default());
        let selected = selector.select("alice", "length_1", 1, Some(Topic::Length)).await.unwrap();

        assert_eq!(selected.target_difficulty, 1);
        assert_eq!(selected.ability, 0.0);
    }

    #[tokio::test]
    async fn test_no_matching_question_yields_no_questions_available() {
        let (ability, questions) = setup().await;
        let selector = QuestionSelector::new(ability, questions, &AdaptiveConfig::default());

        let result = selector.select("bob", "area_2", 2, Some(Topic::Area)).await;
        assert!(matches!(result, Err(CoreError::NoQuestionsAvailable)));
    }

    #[tokio::test]
    async fn test_widens_to_extremes_when_only_far_difficulties_exist() {
        let (ability, questions) = setup().await;
        questions.insert(&question(Topic::Weight, 3, 1)).await.unwrap();
        questions.insert(&question(Topic::Weight, 3, 5)).await.unwrap();

        let selector = QuestionSelector::new(ability, questions, &AdaptiveConfig::default());
        let selected = selector.select("carol", "weight_3", 3, Some(Topic::Weight)).await.unwrap();

        assert!(selected.question.difficulty == 1 || selected.question.difficulty == 5);
    }
}
