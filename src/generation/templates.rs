//! Fallback template questions, used when the generative backend is
//! unreachable, times out, or produces zero valid candidates (§4.4)

use crate::ingest::types::Topic;
use crate::prompt::MeasurementContext;
use crate::question::types::{canonicalize, Question, QuestionMetadata, QuestionType};
use chrono::Utc;
use uuid::Uuid;

struct TemplateBody {
    body: &'static str,
    options: &'static [&'static str],
    correct_answer: &'static str,
    concepts: &'static [&'static str],
    explanation: &'static str,
}

fn templates_for(topic: Topic) -> &'static [TemplateBody] {
    match topic {
        Topic::Length => &[
            TemplateBody {
                body: "Which unit would you use to measure the length of a classroom?",
                options: &["millimeters", "meters", "kilometers"],
                correct_answer: "meters",
                concepts: &["unit_selection"],
                explanation: "Classrooms are a few meters long, so meters is the appropriate unit.",
            },
            TemplateBody {
                body: "A ribbon is 150 centimeters long. How many meters is that?",
                options: &[],
                correct_answer: "1.5",
                concepts: &["unit_conversion"],
                explanation: "100 centimeters equal 1 meter, so 150 cm = 1.5 m.",
            },
        ],
        Topic::Area => &[
            TemplateBody {
                body: "A rectangle is 4 units wide and 5 units tall. What is its area?",
                options: &[],
                correct_answer: "20",
                concepts: &["area_formula"],
                explanation: "Area of a rectangle is width times height: 4 x 5 = 20.",
            },
            TemplateBody {
                body: "Which shape covers more surface: a 3x3 square or a 2x5 rectangle?",
                options: &["3x3 square", "2x5 rectangle", "they are equal"],
                correct_answer: "2x5 rectangle",
                concepts: &["area_comparison"],
                explanation: "3x3 = 9 and 2x5 = 10, so the rectangle covers more surface.",
            },
        ],
        Topic::Capacity => &[
            TemplateBody {
                body: "Which holds more liquid: a cup or a gallon jug?",
                options: &["a cup", "a gallon jug", "they hold the same"],
                correct_answer: "a gallon jug",
                concepts: &["capacity_comparison"],
                explanation: "A gallon is much larger than a cup.",
            },
            TemplateBody {
                body: "A bottle holds 2 liters. How many milliliters is that?",
                options: &[],
                correct_answer: "2000",
                concepts: &["unit_conversion"],
                explanation: "1 liter equals 1000 milliliters, so 2 liters = 2000 milliliters.",
            },
        ],
        Topic::Weight => &[
            TemplateBody {
                body: "Which unit would you use to weigh a bag of apples?",
                options: &["milligrams", "kilograms", "metric tons"],
                correct_answer: "kilograms",
                concepts: &["unit_selection"],
                explanation: "A bag of apples typically weighs a few kilograms.",
            },
            TemplateBody {
                body: "An object weighs 2500 grams. How many kilograms is that?",
                options: &[],
                correct_answer: "2.5",
                concepts: &["unit_conversion"],
                explanation: "1000 grams equal 1 kilogram, so 2500 g = 2.5 kg.",
            },
        ],
    }
}

/// Clamp `grade - 1 ..= grade + 1` into the valid difficulty range.
fn difficulty_for_index(grade: i32, index: usize) -> i32 {
    let offset = (index % 3) as i32 - 1;
    (grade + offset).clamp(1, 5)
}

/// Generate at least `n_questions` template questions for `topic`/`grade`,
/// optionally personalized with a literal measurement context.
pub fn fallback_questions(
    topic: Topic,
    grade: i32,
    n_questions: usize,
    document_id: Uuid,
    measurement_context: Option<&MeasurementContext>,
) -> Vec<Question> {
    let bank = templates_for(topic);
    (0..n_questions.max(1))
        .map(|i| {
            let template = &bank[i % bank.len()];
            build_question(template, topic, grade, i, document_id, measurement_context)
        })
        .collect()
}

fn build_question(
    template: &TemplateBody,
    topic: Topic,
    grade: i32,
    index: usize,
    document_id: Uuid,
    measurement_context: Option<&MeasurementContext>,
) -> Question {
    let question_type = if !template.options.is_empty() {
        QuestionType::MultipleChoice
    } else {
        QuestionType::Numeric
    };

    let (body, personalized_prompt) = match measurement_context {
        Some(ctx) => (
            format!(
                "Using your {object} which measures {value} {unit}: {body}",
                object = ctx.object,
                value = ctx.value,
                unit = ctx.unit,
                body = template.body,
            ),
            Some(format!("your {} ({} {})", ctx.object, ctx.value, ctx.unit)),
        ),
        None => (template.body.to_string(), None),
    };

    Question {
        id: Uuid::new_v4(),
        document_id,
        chunk_ids: Vec::new(),
        topic,
        grade_level: grade,
        difficulty: difficulty_for_index(grade, index),
        question_type,
        body,
        options: template.options.iter().map(|s| s.to_string()).collect(),
        correct_answer: canonicalize(template.correct_answer),
        alternatives: Vec::new(),
        tolerance: None,
        concepts: template.concepts.iter().map(|s| s.to_string()).collect(),
        hints: Vec::new(),
        explanation: template.explanation.to_string(),
        created_at: Utc::now(),
        metadata: QuestionMetadata {
            object: measurement_context.map(|c| c.object.clone()),
            value: measurement_context.map(|c| c.value),
            unit: measurement_context.map(|c| c.unit.clone()),
            personalized_prompt,
            source: Some("template".to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_produces_at_least_requested_count() {
        let questions = fallback_questions(Topic::Length, 3, 4, Uuid::new_v4(), None);
        assert!(questions.len() >= 4);
    }

    #[test]
    fn test_fallback_marks_source_template() {
        let questions = fallback_questions(Topic::Area, 2, 1, Uuid::new_v4(), None);
        assert_eq!(questions[0].metadata.source.as_deref(), Some("template"));
    }

    #[test]
    fn test_fallback_difficulty_within_grade_band() {
        let questions = fallback_questions(Topic::Capacity, 1, 6, Uuid::new_v4(), None);
        for q in &questions {
            assert!(q.difficulty >= 1 && q.difficulty <= 5);
        }
    }

    #[test]
    fn test_fallback_personalization_injects_literal_values() {
        let ctx = MeasurementContext {
            object: "water bottle".to_string(),
            value: 500.0,
            unit: "ml".to_string(),
        };
        let questions = fallback_questions(Topic::Capacity, 3, 1, Uuid::new_v4(), Some(&ctx));
        assert!(questions[0].body.contains("your water bottle"));
        assert!(questions[0].body.contains("500"));
    }
}
