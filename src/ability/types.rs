//! Per-(learner, unit) adaptive state (§3)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

/// Mastery tracking for a single concept, keyed by concept name in
/// `AbilityRecord::concepts_mastered` — a flat map rather than nested
/// dicts-of-dicts, so it serializes to one JSON column.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConceptMastery {
    pub attempted: u32,
    pub correct: u32,
    pub mastery: f64,
}

/// Adaptive state for one (learner_id, unit_id) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbilityRecord {
    pub learner_id: String,
    pub unit_id: String,
    pub ability: f64,
    pub current_difficulty: i32,
    pub total_answered: u32,
    pub total_correct: u32,
    pub concepts_mastered: HashMap<String, ConceptMastery>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AbilityRecord {
    pub fn new(learner_id: String, unit_id: String, initial_difficulty: i32) -> Self {
        let now = Utc::now();
        Self {
            learner_id,
            unit_id,
            ability: 0.0,
            current_difficulty: initial_difficulty,
            total_answered: 0,
            total_correct: 0,
            concepts_mastered: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Immutable answer log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub id: Uuid,
    pub learner_id: String,
    pub question_id: Uuid,
    pub unit_id: String,
    pub answer_given: String,
    pub is_correct: bool,
    pub time_taken_ms: u64,
    pub difficulty_at_attempt: i32,
    pub ability_before: f64,
    pub ability_after: f64,
    pub timestamp: DateTime<Utc>,
}

/// Reported analytics for a learner+unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analytics {
    pub total: u32,
    pub correct: u32,
    pub accuracy: f64,
    pub ability: f64,
    pub difficulty: i32,
    pub concepts_mastered: HashMap<String, ConceptMastery>,
}
