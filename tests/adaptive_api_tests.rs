//! Integration tests driving the HTTP surface end-to-end against an
//! in-memory SQLite pool, covering the adaptive and generation flows that
//! unit tests within each module can't exercise together.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use measure_ade::ability::AbilityStore;
use measure_ade::api::{create_router, AppState};
use measure_ade::config::EngineConfig;
use measure_ade::embedding::EmbeddingIndex;
use measure_ade::generation::GenerationService;
use measure_ade::ingest::{DocumentStore, IngestService, Topic};
use measure_ade::job::GenerationJobStore;
use measure_ade::prompt::PromptComposer;
use measure_ade::question::{Question, QuestionMetadata, QuestionStore, QuestionType};
use measure_ade::selector::QuestionSelector;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

async fn test_state() -> AppState {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let config = EngineConfig::default();

    let document_store = Arc::new(DocumentStore::new(pool.clone()).await.unwrap());
    let embedding_index = Arc::new(EmbeddingIndex::new(pool.clone(), &config.embedding).await.unwrap());
    let question_store = Arc::new(QuestionStore::new(pool.clone()).await.unwrap());
    let ability_store = Arc::new(AbilityStore::new(pool.clone()).await.unwrap());
    let jobs = Arc::new(GenerationJobStore::new(pool.clone()).await.unwrap());

    let ingest = Arc::new(IngestService::new(
        document_store.clone(),
        embedding_index.clone(),
        &config.ingest,
    ));

    struct UnreachableLlm;

    #[async_trait::async_trait]
    impl measure_ade::generation::LlmClient for UnreachableLlm {
        async fn generate(&self, _system: &str, _prompt: &str) -> measure_ade::Result<String> {
            Err(measure_ade::CoreError::Generation(
                measure_ade::error::GenerationError::ServiceUnreachable("no backend in tests".into()),
            ))
        }
    }

    let generation = Arc::new(GenerationService::new(Arc::new(UnreachableLlm), &config.generation));

    let selector = Arc::new(QuestionSelector::new(
        ability_store.clone(),
        question_store.clone(),
        &config.adaptive,
    ));

    let prompt_composer = Arc::new(PromptComposer::new(config.generation.retrieval_context_chars));

    AppState {
        ingest,
        embedding_index,
        questions: question_store,
        ability: ability_store,
        selector,
        generation,
        jobs,
        prompt_composer,
        config: Arc::new(config),
    }
}

fn sample_question(document_id: Uuid, topic: Topic, grade: i32, difficulty: i32) -> Question {
    Question {
        id: Uuid::new_v4(),
        document_id,
        chunk_ids: vec![],
        topic,
        grade_level: grade,
        difficulty,
        question_type: QuestionType::MultipleChoice,
        body: "How long is the pencil?".to_string(),
        options: vec!["5 cm".to_string(), "50 cm".to_string(), "5 m".to_string()],
        correct_answer: "5 cm".to_string(),
        alternatives: vec![],
        tolerance: None,
        concepts: ["unit_conversion".to_string()].into_iter().collect(),
        hints: vec![],
        explanation: "A pencil is about 5 cm long.".to_string(),
        created_at: chrono::Utc::now(),
        metadata: QuestionMetadata::default(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_reports_zero_index_size_when_empty() {
    let state = test_state().await;
    let router = create_router(state);

    let response = router
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["index_size"], 0);
}

#[tokio::test]
async fn next_question_returns_404_when_catalog_is_empty() {
    let state = test_state().await;
    let router = create_router(state);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/adaptive/next?learner_id=alice&unit_id=length_1&grade=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn next_question_targets_grade_level_on_first_call() {
    let state = test_state().await;
    let document_id = Uuid::new_v4();
    state
        .questions
        .insert(&sample_question(document_id, Topic::Length, 2, 2))
        .await
        .unwrap();
    let router = create_router(state);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/adaptive/next?learner_id=bob&unit_id=length_2&grade=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["target_difficulty"], 2);
    assert_eq!(body["ability"], 0.0);
}

#[tokio::test]
async fn correct_answer_raises_ability_and_wrong_answer_lowers_it() {
    let state = test_state().await;
    let document_id = Uuid::new_v4();
    let question = sample_question(document_id, Topic::Length, 3, 3);
    state.questions.insert(&question).await.unwrap();
    let router = create_router(state);

    let request_body = json!({
        "learner_id": "carol",
        "unit_id": "length_3",
        "question_id": question.id,
        "answer": "5 cm",
        "time_taken_ms": 4000,
    });

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/adaptive/answer")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&request_body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_correct"], true);
    assert!(body["ability_after"].as_f64().unwrap() > body["ability_before"].as_f64().unwrap());
}

#[tokio::test]
async fn wrong_answer_is_canonicalized_case_and_whitespace_insensitively() {
    let state = test_state().await;
    let document_id = Uuid::new_v4();
    let question = sample_question(document_id, Topic::Length, 3, 3);
    state.questions.insert(&question).await.unwrap();
    let router = create_router(state);

    let request_body = json!({
        "learner_id": "dave",
        "unit_id": "length_3",
        "question_id": question.id,
        "answer": "  5 CM  ",
        "time_taken_ms": 2000,
    });

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/adaptive/answer")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&request_body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["is_correct"], true);
}

#[tokio::test]
async fn analytics_reflects_submitted_answers() {
    let state = test_state().await;
    let document_id = Uuid::new_v4();
    let question = sample_question(document_id, Topic::Length, 1, 1);
    state.questions.insert(&question).await.unwrap();
    let router = create_router(state);

    let answer_body = json!({
        "learner_id": "erin",
        "unit_id": "length_1",
        "question_id": question.id,
        "answer": "5 cm",
        "time_taken_ms": 1000,
    });

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/adaptive/answer")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&answer_body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/adaptive/analytics?learner_id=erin&unit_id=length_1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["correct"], 1);
    assert_eq!(body["accuracy"], 1.0);
}

#[tokio::test]
async fn list_questions_filters_by_topic_and_difficulty() {
    let state = test_state().await;
    let document_id = Uuid::new_v4();
    state
        .questions
        .insert(&sample_question(document_id, Topic::Length, 2, 1))
        .await
        .unwrap();
    state
        .questions
        .insert(&sample_question(document_id, Topic::Area, 2, 1))
        .await
        .unwrap();
    let router = create_router(state);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/questions?topic=length&grade=2&difficulty=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let results = body.as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["topic"], "length");
}

#[tokio::test]
async fn get_document_404s_for_unknown_id() {
    let state = test_state().await;
    let router = create_router(state);

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/documents/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_document_without_cascade_preserves_questions() {
    let state = test_state().await;
    let document = state
        .ingest
        .register(
            "Measuring Things".to_string(),
            Topic::Length,
            vec![1, 2],
            "teacher@example.com".to_string(),
        )
        .await
        .unwrap();
    state
        .questions
        .insert(&sample_question(document.id, Topic::Length, 1, 1))
        .await
        .unwrap();
    let questions = state.questions.clone();
    let router = create_router(state);

    let response = router
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/documents/{}", document.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let remaining = questions
        .list(&measure_ade::QuestionFilter {
            document_id: Some(document.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn delete_document_with_cascade_removes_questions() {
    let state = test_state().await;
    let document = state
        .ingest
        .register(
            "Measuring Things".to_string(),
            Topic::Length,
            vec![1, 2],
            "teacher@example.com".to_string(),
        )
        .await
        .unwrap();
    state
        .questions
        .insert(&sample_question(document.id, Topic::Length, 1, 1))
        .await
        .unwrap();
    let questions = state.questions.clone();
    let router = create_router(state);

    let response = router
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/documents/{}?cascade=true", document.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let remaining = questions
        .list(&measure_ade::QuestionFilter {
            document_id: Some(document.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(remaining.is_empty());
}
