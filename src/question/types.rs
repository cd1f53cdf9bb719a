//! Question data model (§3)

use crate::ingest::types::Topic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    ShortAnswer,
    Numeric,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::ShortAnswer => "short_answer",
            QuestionType::Numeric => "numeric",
        }
    }
}

impl std::str::FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multiple_choice" => Ok(QuestionType::MultipleChoice),
            "short_answer" => Ok(QuestionType::ShortAnswer),
            "numeric" => Ok(QuestionType::Numeric),
            other => Err(format!("unknown question type: {other}")),
        }
    }
}

/// Optional AR/personalization context carried on a generated question
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct QuestionMetadata {
    pub object: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub personalized_prompt: Option<String>,
    pub source: Option<String>,
}

/// A generated, structured item
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Question {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_ids: Vec<Uuid>,
    pub topic: Topic,
    pub grade_level: i32,
    pub difficulty: i32,
    pub question_type: QuestionType,
    pub body: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub alternatives: Vec<String>,
    pub tolerance: Option<f64>,
    pub concepts: HashSet<String>,
    pub hints: Vec<String>,
    pub explanation: String,
    pub created_at: DateTime<Utc>,
    pub metadata: QuestionMetadata,
}

/// Canonical form used when comparing answers: trimmed and lowercased
pub fn canonicalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Conjunctive filter over persisted questions
#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub topic: Option<Topic>,
    pub grade_level: Option<i32>,
    pub difficulty: Option<i32>,
    pub difficulty_range: Option<(i32, i32)>,
    pub document_id: Option<Uuid>,
    pub concept: Option<String>,
}
