//! Candidate JSON validation and parsing (C4)

use crate::ingest::types::Topic;
use crate::question::types::{canonicalize, Question, QuestionMetadata, QuestionType};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashSet;
use uuid::Uuid;

/// Raw shape the generative backend is prompted to emit
#[derive(Debug, Deserialize)]
pub struct RawCandidate {
    #[serde(rename = "type")]
    pub question_type: String,
    pub body: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub concepts: Vec<String>,
    pub difficulty: i32,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub explanation: String,
}

/// Parse a raw JSON array of candidates emitted by the generation backend,
/// discarding any that fail validation individually.
pub fn parse_candidates(
    raw_json: &str,
    document_id: Uuid,
    chunk_ids: &[Uuid],
    topic: Topic,
    grade_level: i32,
) -> Vec<Question> {
    let candidates: Vec<RawCandidate> = match serde_json::from_str(raw_json) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    candidates
        .into_iter()
        .filter_map(|c| validate_and_convert(c, document_id, chunk_ids, topic, grade_level, "model"))
        .collect()
}

/// Validate a single candidate and convert it to a persisted-shape Question.
/// Returns None for anything the parser rejects individually.
pub fn validate_and_convert(
    candidate: RawCandidate,
    document_id: Uuid,
    chunk_ids: &[Uuid],
    topic: Topic,
    grade_level: i32,
    source: &str,
) -> Option<Question> {
    let question_type: QuestionType = candidate.question_type.parse().ok()?;

    if candidate.difficulty < 1 || candidate.difficulty > 5 {
        return None;
    }

    if candidate.body.trim().is_empty() {
        return None;
    }

    let correct_answer = canonicalize(&candidate.correct_answer);
    if correct_answer.is_empty() {
        return None;
    }

    match question_type {
        QuestionType::MultipleChoice => {
            if candidate.options.is_empty() {
                return None;
            }

            let canonical_options: Vec<String> = candidate.options.iter().map(|o| canonicalize(o)).collect();
            let unique: HashSet<&String> = canonical_options.iter().collect();
            if unique.len() != canonical_options.len() {
                return None;
            }

            if !canonical_options.contains(&correct_answer) {
                return None;
            }
        }
        QuestionType::ShortAnswer | QuestionType::Numeric => {
            if !candidate.options.is_empty() {
                return None;
            }
        }
    }

    Some(Question {
        id: Uuid::new_v4(),
        document_id,
        chunk_ids: chunk_ids.to_vec(),
        topic,
        grade_level,
        difficulty: candidate.difficulty,
        question_type,
        body: candidate.body,
        options: candidate.options,
        correct_answer,
        alternatives: candidate.alternatives.iter().map(|a| canonicalize(a)).collect(),
        tolerance: candidate.tolerance,
        concepts: candidate.concepts.into_iter().collect(),
        hints: candidate.hints,
        explanation: candidate.explanation,
        created_at: Utc::now(),
        metadata: QuestionMetadata {
            source: Some(source.to_string()),
            ..Default::default()
        },
    })
}
