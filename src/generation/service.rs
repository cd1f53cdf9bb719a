//! C4 orchestration: invoke the generation backend, parse, fall back to templates

use crate::config::GenerationConfig;
use crate::generation::llm::LlmClient;
use crate::generation::parser::parse_candidates;
use crate::generation::templates::fallback_questions;
use crate::ingest::types::Topic;
use crate::prompt::{MeasurementContext, PromptPayload};
use crate::question::types::Question;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;
use uuid::Uuid;

pub struct GenerationService {
    llm: Arc<dyn LlmClient>,
    llm_timeout: Duration,
}

impl GenerationService {
    pub fn new(llm: Arc<dyn LlmClient>, config: &GenerationConfig) -> Self {
        Self {
            llm,
            llm_timeout: Duration::from_secs(config.llm_timeout_s),
        }
    }

    /// Produce at least `n_questions` questions for the given document/topic/grade.
    ///
    /// Falls back to the template bank whenever the backend is unreachable,
    /// times out, or validates to zero candidates — the caller never sees a
    /// hard failure here, only which source produced the result.
    pub async fn generate(
        &self,
        prompt: &PromptPayload,
        n_questions: usize,
        document_id: Uuid,
        chunk_ids: &[Uuid],
        topic: Topic,
        grade: i32,
        measurement_context: Option<&MeasurementContext>,
    ) -> Vec<Question> {
        let system = prompt.system.clone();
        let body = format!("{}\n\n{}", prompt.context, prompt.instructions);

        let raw = timeout(self.llm_timeout, self.llm.generate(&system, &body)).await;

        let candidates = match raw {
            Ok(Ok(text)) => parse_candidates(&text, document_id, chunk_ids, topic, grade),
            Ok(Err(e)) => {
                warn!(error = %e, "generation backend call failed, falling back to templates");
                Vec::new()
            }
            Err(_) => {
                warn!("generation backend timed out, falling back to templates");
                Vec::new()
            }
        };

        if candidates.len() >= n_questions {
            candidates
        } else {
            let mut result = candidates;
            let needed = n_questions.saturating_sub(result.len());
            result.extend(fallback_questions(
                topic,
                grade,
                needed,
                document_id,
                measurement_context,
            ));
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, GenerationError, Result};
    use async_trait::async_trait;

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String> {
            Err(CoreError::Generation(GenerationError::ServiceUnreachable(
                "down".to_string(),
            )))
        }
    }

    struct WorkingLlm(String);

    #[async_trait]
    impl LlmClient for WorkingLlm {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    fn prompt() -> PromptPayload {
        PromptPayload {
            system: "sys".into(),
            context: "ctx".into(),
            instructions: "do it".into(),
        }
    }

    #[tokio::test]
    async fn test_falls_back_to_templates_when_backend_fails() {
        let service = GenerationService::new(
            Arc::new(FailingLlm),
            &GenerationConfig::default(),
        );

        let questions = service
            .generate(&prompt(), 2, Uuid::new_v4(), &[], Topic::Length, 3, None)
            .await;

        assert_eq!(questions.len(), 2);
        assert!(questions.iter().all(|q| q.metadata.source.as_deref() == Some("template")));
    }

    #[tokio::test]
    async fn test_uses_valid_model_candidates_without_fallback() {
        let json = r#"[{
            "type": "numeric",
            "body": "How many cm in 2 m?",
            "options": [],
            "correct_answer": "200",
            "concepts": ["unit_conversion"],
            "difficulty": 3,
            "hints": [],
            "explanation": "2 m = 200 cm"
        }]"#;

        let service = GenerationService::new(
            Arc::new(WorkingLlm(json.to_string())),
            &GenerationConfig::default(),
        );

        let questions = service
            .generate(&prompt(), 1, Uuid::new_v4(), &[], Topic::Length, 3, None)
            .await;

        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].metadata.source, None);
    }

    #[tokio::test]
    async fn test_partial_valid_candidates_topped_up_with_templates() {
        let json = r#"[{
            "type": "numeric",
            "body": "How many cm in 1 m?",
            "options": [],
            "correct_answer": "100",
            "concepts": ["unit_conversion"],
            "difficulty": 3,
            "hints": [],
            "explanation": "1 m = 100 cm"
        }]"#;

        let service = GenerationService::new(
            Arc::new(WorkingLlm(json.to_string())),
            &GenerationConfig::default(),
        );

        let questions = service
            .generate(&prompt(), 3, Uuid::new_v4(), &[], Topic::Length, 3, None)
            .await;

        assert_eq!(questions.len(), 3);
        assert_eq!(
            questions.iter().filter(|q| q.metadata.source.is_none()).count(),
            1
        );
        assert_eq!(
            questions.iter().filter(|q| q.metadata.source.as_deref() == Some("template")).count(),
            2
        );
    }
}
