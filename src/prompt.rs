//! Grade-conditioned generation prompt assembly (C3)

use crate::embedding::RetrievedChunk;
use crate::ingest::types::Topic;
use serde::{Deserialize, Serialize};

/// Literal object/value/unit context used to personalize a generation prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementContext {
    pub object: String,
    pub value: f64,
    pub unit: String,
}

/// Assembled prompt ready to hand to the generation backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptPayload {
    pub system: String,
    pub context: String,
    pub instructions: String,
}

impl PromptPayload {
    /// Flatten into a single prompt string for backends with no role separation
    pub fn as_single_prompt(&self) -> String {
        format!("{}\n\n{}\n\n{}", self.system, self.context, self.instructions)
    }
}

struct GradeGuideline {
    vocabulary: &'static str,
    cognitive_depth: &'static str,
    length_hint: &'static str,
}

fn grade_guideline(grade: i32) -> GradeGuideline {
    match grade {
        1 => GradeGuideline {
            vocabulary: "concrete nouns, prefer one-syllable words",
            cognitive_depth: "recognition and direct recall",
            length_hint: "5-10 words",
        },
        2 => GradeGuideline {
            vocabulary: "common school vocabulary",
            cognitive_depth: "basic comprehension, one-step calculation",
            length_hint: "8-15 words",
        },
        3 => GradeGuideline {
            vocabulary: "classroom vocabulary plus tens and hundreds",
            cognitive_depth: "application, two-step reasoning",
            length_hint: "12-25 words",
        },
        4 => GradeGuideline {
            vocabulary: "expanded vocabulary with comparative terms",
            cognitive_depth: "analysis, word problems",
            length_hint: "15-40 words",
        },
        _ => GradeGuideline {
            vocabulary: "advanced vocabulary",
            cognitive_depth: "multi-step reasoning",
            length_hint: "15-50 words",
        },
    }
}

/// Builds grade-appropriate generation prompts from retrieved context
pub struct PromptComposer {
    max_context_chars: usize,
}

impl PromptComposer {
    pub fn new(max_context_chars: usize) -> Self {
        Self { max_context_chars }
    }

    pub fn compose(
        &self,
        topic: Topic,
        grade: i32,
        n_questions: usize,
        question_types: &[&str],
        retrieved_chunks: &[RetrievedChunk],
        measurement_context: Option<&MeasurementContext>,
    ) -> PromptPayload {
        let guideline = grade_guideline(grade);

        let system = format!(
            "You are writing {topic} measurement questions for grade {grade} students. \
             Use {vocabulary}. Target {depth}. Keep each question body to roughly {length}.",
            topic = topic,
            grade = grade,
            vocabulary = guideline.vocabulary,
            depth = guideline.cognitive_depth,
            length = guideline.length_hint,
        );

        let context = self.concatenate_context(retrieved_chunks);

        let types_str = if question_types.is_empty() {
            "multiple_choice, short_answer, numeric".to_string()
        } else {
            question_types.join(", ")
        };

        let mut instructions = format!(
            "Generate {n_questions} questions of type(s) [{types_str}] grounded in the context above. \
             Return a JSON array of candidates; each must include type, body, options (if multiple_choice), \
             correct_answer, concepts, difficulty (1-5), hints, and explanation."
        );

        if let Some(ctx) = measurement_context {
            instructions.push_str(&format!(
                "\n\nPersonalize the question: refer to the object as \"your {object}\" (use the literal \
                 words \"your\"/\"YOUR\"), state the measurement value {value} and unit \"{unit}\" verbatim, \
                 and avoid generic phrasing such as \"A pencil is\".",
                object = ctx.object,
                value = ctx.value,
                unit = ctx.unit,
            ));
        }

        PromptPayload {
            system,
            context,
            instructions,
        }
    }

    fn concatenate_context(&self, chunks: &[RetrievedChunk]) -> String {
        let mut out = String::new();
        for chunk in chunks {
            if out.chars().count() >= self.max_context_chars {
                break;
            }
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&chunk.text);
        }

        if out.chars().count() > self.max_context_chars {
            out = out.chars().take(self.max_context_chars).collect();
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn chunk(text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            text: text.to_string(),
            score: 0.9,
        }
    }

    #[test]
    fn test_context_truncated_to_limit() {
        let composer = PromptComposer::new(20);
        let chunks = vec![chunk(&"x".repeat(50))];
        let payload = composer.compose(Topic::Length, 3, 2, &["multiple_choice"], &chunks, None);
        assert!(payload.context.chars().count() <= 20);
    }

    #[test]
    fn test_personalization_includes_literal_value_and_your() {
        let composer = PromptComposer::new(1500);
        let ctx = MeasurementContext {
            object: "backpack".to_string(),
            value: 3.5,
            unit: "kg".to_string(),
        };
        let payload = composer.compose(Topic::Weight, 4, 1, &[], &[], Some(&ctx));
        assert!(payload.instructions.contains("your"));
        assert!(payload.instructions.contains("backpack"));
        assert!(payload.instructions.contains("3.5"));
        assert!(payload.instructions.contains("kg"));
    }

    #[test]
    fn test_grade_one_uses_recognition_guideline() {
        let composer = PromptComposer::new(1500);
        let payload = composer.compose(Topic::Capacity, 1, 3, &[], &[], None);
        assert!(payload.system.contains("recognition"));
    }

    #[test]
    fn test_no_measurement_context_omits_personalization_block() {
        let composer = PromptComposer::new(1500);
        let payload = composer.compose(Topic::Area, 2, 1, &[], &[], None);
        assert!(!payload.instructions.contains("Personalize"));
    }
}
