//! HTTP-style API surface (C9 orchestrator)
//!
//! Composes C1-C8 into the upload / generate / next-question / submit-answer
//! / analytics flows described in spec §4.9 and exposes them as an axum
//! router matching the transport-agnostic interface in spec §6.

use crate::ability::{AbilityRecord, AbilityStore, AnswerRecord};
use crate::ability::irt;
use crate::config::EngineConfig;
use crate::embedding::{EmbeddingIndex, RetrievalFilter};
use crate::error::{CoreError, IngestError, Result};
use crate::generation::GenerationService;
use crate::ingest::{Document, DocumentStatus, IngestService, Topic};
use crate::job::GenerationJobStore;
use crate::prompt::{MeasurementContext, PromptComposer};
use crate::question::{canonicalize, Question, QuestionFilter, QuestionMetadata, QuestionStore, QuestionType};
use crate::selector::QuestionSelector;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

/// Shared application state for every handler
#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestService>,
    pub embedding_index: Arc<EmbeddingIndex>,
    pub questions: Arc<QuestionStore>,
    pub ability: Arc<AbilityStore>,
    pub selector: Arc<QuestionSelector>,
    pub generation: Arc<GenerationService>,
    pub jobs: Arc<GenerationJobStore>,
    pub prompt_composer: Arc<PromptComposer>,
    pub config: Arc<EngineConfig>,
}

/// Wraps `CoreError` so every handler can return it directly and have it
/// mapped to the status codes in spec §6/§7.
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub category: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Ingest(IngestError::UnsupportedFormat(_)) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            CoreError::Ingest(IngestError::FileTooLarge(_, _)) => StatusCode::PAYLOAD_TOO_LARGE,
            CoreError::Ingest(IngestError::ContentTooShort(_, _)) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Ingest(IngestError::ExtractionFailed(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Index(_) => StatusCode::BAD_GATEWAY,
            CoreError::Generation(_) => StatusCode::BAD_GATEWAY,
            CoreError::Store(crate::error::StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Store(crate::error::StoreError::StaleRecord { .. }) => StatusCode::CONFLICT,
            CoreError::Store(crate::error::StoreError::InvariantViolation(_)) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::NoQuestionsAvailable => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::Database(_) | CoreError::Io(_) | CoreError::Serialization(_) | CoreError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CoreError::Http(_) => StatusCode::BAD_GATEWAY,
        };

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
            category: self.0.category().to_string(),
        });

        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(OpenApi)]
#[openapi(
    paths(
        healthz_handler,
        get_document_handler,
        delete_document_handler,
        generate_handler,
        list_questions_handler,
        next_question_handler,
        submit_answer_handler,
        analytics_handler,
    ),
    components(schemas(
        UploadResponse,
        GenerateRequest,
        MeasurementContextPayload,
        GenerateResponse,
        NextQuestionResponse,
        SubmitAnswerRequest,
        SubmitAnswerResponse,
        AnalyticsResponse,
        HealthResponse,
        ErrorResponse,
        Document,
        Question,
        QuestionMetadata,
        QuestionType,
        Topic,
        DocumentStatus,
        crate::ability::ConceptMastery,
    )),
    tags(
        (name = "documents", description = "Curriculum document ingestion and generation"),
        (name = "questions", description = "Generated question catalog"),
        (name = "adaptive", description = "IRT-driven adaptive difficulty engine"),
        (name = "health", description = "Liveness and index size"),
    ),
    info(title = "measure-ade API", version = "0.1.0", description = "Retrieval-augmented question generation and adaptive difficulty engine")
)]
struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/documents", post(upload_document_handler))
        .route("/documents/{id}", get(get_document_handler).delete(delete_document_handler))
        .route("/documents/{id}/generate", post(generate_handler))
        .route("/questions", get(list_questions_handler))
        .route("/adaptive/next", get(next_question_handler))
        .route("/adaptive/answer", post(submit_answer_handler))
        .route("/adaptive/analytics", get(analytics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/api-docs/openapi.json", get(openapi_spec_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn openapi_spec_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

// ===================== POST /documents =====================

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub id: Uuid,
    pub status: String,
}

#[utoipa::path(post, path = "/documents", tag = "documents", responses(
    (status = 200, description = "Document ingested", body = UploadResponse),
    (status = 400, description = "Invalid request"),
    (status = 413, description = "File too large"),
    (status = 415, description = "Unsupported format"),
    (status = 422, description = "Extracted content too short"),
))]
async fn upload_document_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut title: Option<String> = None;
    let mut topic: Option<String> = None;
    let mut grade_levels: Option<String> = None;
    let mut uploader: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CoreError::Validation(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                content_type = field.content_type().map(|s| s.to_string());
                file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| CoreError::Validation(e.to_string()))?
                        .to_vec(),
                );
            }
            "title" => title = Some(field.text().await.map_err(|e| CoreError::Validation(e.to_string()))?),
            "topic" => topic = Some(field.text().await.map_err(|e| CoreError::Validation(e.to_string()))?),
            "grade_levels" => {
                grade_levels = Some(field.text().await.map_err(|e| CoreError::Validation(e.to_string()))?)
            }
            "uploader" => {
                uploader = Some(field.text().await.map_err(|e| CoreError::Validation(e.to_string()))?)
            }
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| CoreError::Validation("missing field: file".to_string()))?;
    let title = title.ok_or_else(|| CoreError::Validation("missing field: title".to_string()))?;
    let topic_str = topic.ok_or_else(|| CoreError::Validation("missing field: topic".to_string()))?;
    let grade_levels_str =
        grade_levels.ok_or_else(|| CoreError::Validation("missing field: grade_levels".to_string()))?;
    let uploader = uploader.ok_or_else(|| CoreError::Validation("missing field: uploader".to_string()))?;

    let max_bytes = state.config.ingest.max_file_bytes;
    if file_bytes.len() > max_bytes {
        return Err(CoreError::Ingest(IngestError::FileTooLarge(file_bytes.len(), max_bytes)).into());
    }

    let topic = Topic::from_str(&topic_str).map_err(CoreError::Validation)?;
    let grade_levels = parse_grade_levels(&grade_levels_str)?;

    let document = state
        .ingest
        .register(title, topic, grade_levels, uploader)
        .await?;

    let outcome = state
        .ingest
        .ingest(
            &document,
            &file_bytes,
            content_type.as_deref().unwrap_or(""),
            filename.as_deref(),
        )
        .await?;

    Ok(Json(UploadResponse {
        id: document.id,
        status: outcome.status.as_str().to_string(),
    }))
}

fn parse_grade_levels(csv: &str) -> Result<Vec<i32>> {
    csv.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i32>()
                .map_err(|_| CoreError::Validation(format!("invalid grade level: {s}")))
        })
        .collect()
}

// ===================== GET/DELETE /documents/{id} =====================

#[utoipa::path(get, path = "/documents/{id}", tag = "documents", responses(
    (status = 200, description = "Document found", body = Document),
    (status = 404, description = "Document not found"),
))]
async fn get_document_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Document>> {
    let doc = state
        .ingest
        .get(id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("document {id}")))?;
    Ok(Json(doc))
}

#[derive(Debug, Deserialize)]
struct DeleteDocumentQuery {
    #[serde(default)]
    cascade: bool,
}

#[utoipa::path(delete, path = "/documents/{id}", tag = "documents", responses(
    (status = 204, description = "Deleted"),
    (status = 404, description = "Document not found"),
))]
async fn delete_document_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteDocumentQuery>,
) -> ApiResult<StatusCode> {
    state
        .ingest
        .get(id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("document {id}")))?;

    if query.cascade {
        for question in state.questions.list(&QuestionFilter { document_id: Some(id), ..Default::default() }).await? {
            state.questions.delete(question.id).await?;
        }
    }

    state.ingest.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ===================== POST /documents/{id}/generate =====================

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateRequest {
    pub grade_levels: Vec<i32>,
    pub n_per_grade: usize,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub measurement_context: Option<MeasurementContextPayload>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MeasurementContextPayload {
    pub object: String,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateResponse {
    pub question_ids: Vec<Uuid>,
}

#[utoipa::path(post, path = "/documents/{id}/generate", tag = "documents", request_body = GenerateRequest, responses(
    (status = 200, description = "Questions generated", body = GenerateResponse),
    (status = 404, description = "Document not found"),
    (status = 409, description = "Document not ready"),
))]
async fn generate_handler(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Json<GenerateResponse>> {
    let document = state
        .ingest
        .get(document_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("document {document_id}")))?;

    if document.status != DocumentStatus::Ready {
        return Err(CoreError::Conflict(format!(
            "document {document_id} is not ready (status={:?})",
            document.status
        ))
        .into());
    }

    for grade in &request.grade_levels {
        if !document.grade_levels.contains(grade) {
            return Err(CoreError::Validation(format!(
                "grade {grade} is not among the document's grade_levels"
            ))
            .into());
        }
    }

    let job = state.jobs.create(document_id).await.map_err(CoreError::Database)?;
    state.jobs.mark_running(job.id).await.map_err(CoreError::Database)?;

    let measurement_context = request.measurement_context.as_ref().map(|m| MeasurementContext {
        object: m.object.clone(),
        value: m.value,
        unit: m.unit.clone(),
    });

    let question_types: Vec<&str> = request.types.iter().map(|s| s.as_str()).collect();
    let mut all_ids = Vec::new();

    for &grade in &request.grade_levels {
        let retrieval_query = format!("{} measurement for grade {}", document.topic, grade);
        let retrieved = state
            .embedding_index
            .query(
                &retrieval_query,
                state.config.embedding.retrieval_k,
                &RetrievalFilter {
                    topic: Some(document.topic),
                    grade_level: Some(grade),
                    document_id: Some(document_id),
                },
            )
            .await?;

        let chunk_ids: Vec<Uuid> = retrieved.iter().map(|c| c.chunk_id).collect();

        let prompt = state.prompt_composer.compose(
            document.topic,
            grade,
            request.n_per_grade,
            &question_types,
            &retrieved,
            measurement_context.as_ref(),
        );

        let questions = state
            .generation
            .generate(
                &prompt,
                request.n_per_grade,
                document_id,
                &chunk_ids,
                document.topic,
                grade,
                measurement_context.as_ref(),
            )
            .await;

        for question in &questions {
            if let Err(e) = state.questions.insert(question).await {
                warn!(error = %e, "discarding invalid generated question");
                continue;
            }
            all_ids.push(question.id);
        }
    }

    if all_ids.is_empty() {
        state
            .jobs
            .mark_failed(job.id, "no valid questions produced")
            .await
            .map_err(CoreError::Database)?;
    } else {
        state.jobs.mark_ready(job.id).await.map_err(CoreError::Database)?;
    }

    info!(document_id = %document_id, count = all_ids.len(), "generation complete");

    Ok(Json(GenerateResponse { question_ids: all_ids }))
}

// ===================== GET /questions =====================

#[derive(Debug, Deserialize)]
struct ListQuestionsQuery {
    topic: Option<String>,
    grade: Option<i32>,
    difficulty: Option<i32>,
}

#[utoipa::path(get, path = "/questions", tag = "questions", responses(
    (status = 200, description = "Matching questions", body = Vec<Question>),
))]
async fn list_questions_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuestionsQuery>,
) -> ApiResult<Json<Vec<Question>>> {
    let topic = query
        .topic
        .as_deref()
        .map(Topic::from_str)
        .transpose()
        .map_err(CoreError::Validation)?;

    let filter = QuestionFilter {
        topic,
        grade_level: query.grade,
        difficulty: query.difficulty,
        ..Default::default()
    };

    let results = state.questions.list(&filter).await?;
    Ok(Json(results))
}

// ===================== GET /adaptive/next =====================

#[derive(Debug, Deserialize)]
struct NextQuestionQuery {
    learner_id: String,
    unit_id: String,
    grade: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NextQuestionResponse {
    pub question: Question,
    pub ability: f64,
    pub target_difficulty: i32,
}

#[utoipa::path(get, path = "/adaptive/next", tag = "adaptive", responses(
    (status = 200, description = "Selected question", body = NextQuestionResponse),
    (status = 404, description = "No questions available"),
))]
async fn next_question_handler(
    State(state): State<AppState>,
    Query(query): Query<NextQuestionQuery>,
) -> ApiResult<Json<NextQuestionResponse>> {
    let selected = state
        .selector
        .select(&query.learner_id, &query.unit_id, query.grade, None)
        .await?;

    Ok(Json(NextQuestionResponse {
        question: selected.question,
        ability: selected.ability,
        target_difficulty: selected.target_difficulty,
    }))
}

// ===================== POST /adaptive/answer =====================

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitAnswerRequest {
    pub learner_id: String,
    pub unit_id: String,
    pub question_id: Uuid,
    pub answer: String,
    pub time_taken_ms: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitAnswerResponse {
    pub is_correct: bool,
    pub ability_before: f64,
    pub ability_after: f64,
    pub delta: f64,
    pub next_difficulty: i32,
    pub correct_answer: String,
    pub explanation: String,
}

fn answer_is_correct(question: &Question, answer_given: &str) -> bool {
    match question.question_type {
        QuestionType::MultipleChoice => canonicalize(answer_given) == question.correct_answer,
        QuestionType::ShortAnswer => {
            let given = canonicalize(answer_given);
            given == question.correct_answer || question.alternatives.iter().any(|a| *a == given)
        }
        QuestionType::Numeric => {
            let tolerance = question.tolerance.unwrap_or(1e-6);
            match (answer_given.trim().parse::<f64>(), question.correct_answer.parse::<f64>()) {
                (Ok(given), Ok(expected)) => (given - expected).abs() <= tolerance,
                _ => false,
            }
        }
    }
}

#[utoipa::path(post, path = "/adaptive/answer", tag = "adaptive", request_body = SubmitAnswerRequest, responses(
    (status = 200, description = "Answer recorded", body = SubmitAnswerResponse),
    (status = 404, description = "Question not found"),
    (status = 409, description = "Stale ability record after retry"),
))]
async fn submit_answer_handler(
    State(state): State<AppState>,
    Json(request): Json<SubmitAnswerRequest>,
) -> ApiResult<Json<SubmitAnswerResponse>> {
    let question = state
        .questions
        .get(request.question_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("question {}", request.question_id)))?;

    let is_correct = answer_is_correct(&question, &request.answer);

    let adaptive = &state.config.adaptive;
    let initial_difficulty = question.grade_level.clamp(adaptive.min_difficulty, adaptive.max_difficulty);

    // §7 StaleRecord policy: retry once on optimistic-concurrency conflict,
    // surface a 409 on the second failure.
    let mut last_err = None;
    for attempt in 0..2 {
        let record = state
            .ability
            .get_or_init(&request.learner_id, &request.unit_id, initial_difficulty)
            .await?;

        match apply_answer(&state, &question, &record, is_correct, &request).await {
            Ok(outcome) => return Ok(Json(outcome)),
            Err(CoreError::Store(crate::error::StoreError::StaleRecord { expected, actual })) => {
                debug!(attempt, expected, actual, "stale ability record, retrying");
                last_err = Some(CoreError::Store(crate::error::StoreError::StaleRecord { expected, actual }));
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| CoreError::Conflict("stale ability record".to_string())).into())
}

async fn apply_answer(
    state: &AppState,
    question: &Question,
    record: &AbilityRecord,
    is_correct: bool,
    request: &SubmitAnswerRequest,
) -> Result<SubmitAnswerResponse> {
    let adaptive = &state.config.adaptive;
    let theta_before = record.ability;

    let (theta_after, delta) = irt::update_ability(
        theta_before,
        question.difficulty,
        is_correct,
        adaptive.learning_rate,
        adaptive.ability_clamp,
    );

    let next_difficulty = irt::target_difficulty(
        question.grade_level,
        theta_after,
        adaptive.min_difficulty,
        adaptive.max_difficulty,
    );

    let mut updated = record.clone();
    updated.ability = theta_after;
    updated.current_difficulty = next_difficulty;
    updated.total_answered += 1;
    if is_correct {
        updated.total_correct += 1;
    }

    for concept in &question.concepts {
        let entry = updated
            .concepts_mastered
            .entry(concept.clone())
            .or_insert(crate::ability::ConceptMastery { attempted: 0, correct: 0, mastery: 0.0 });
        let (attempted, correct, mastery) = irt::update_mastery(entry.attempted, entry.correct, is_correct);
        entry.attempted = attempted;
        entry.correct = correct;
        entry.mastery = mastery;
    }

    let saved = state.ability.update(updated, record.updated_at).await?;

    state
        .ability
        .append_answer(&AnswerRecord {
            id: Uuid::new_v4(),
            learner_id: request.learner_id.clone(),
            question_id: question.id,
            unit_id: request.unit_id.clone(),
            answer_given: request.answer.clone(),
            is_correct,
            time_taken_ms: request.time_taken_ms,
            difficulty_at_attempt: question.difficulty,
            ability_before: theta_before,
            ability_after: theta_after,
            timestamp: chrono::Utc::now(),
        })
        .await?;

    Ok(SubmitAnswerResponse {
        is_correct,
        ability_before: theta_before,
        ability_after: saved.ability,
        delta,
        next_difficulty: saved.current_difficulty,
        correct_answer: question.correct_answer.clone(),
        explanation: question.explanation.clone(),
    })
}

// ===================== GET /adaptive/analytics =====================

#[derive(Debug, Deserialize)]
struct AnalyticsQuery {
    learner_id: String,
    unit_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyticsResponse {
    pub total: u32,
    pub correct: u32,
    pub accuracy: f64,
    pub ability: f64,
    pub difficulty: i32,
    pub concepts_mastered: std::collections::HashMap<String, crate::ability::ConceptMastery>,
}

#[utoipa::path(get, path = "/adaptive/analytics", tag = "adaptive", responses(
    (status = 200, description = "Learner-unit analytics", body = AnalyticsResponse),
    (status = 404, description = "No ability record for this learner/unit"),
))]
async fn analytics_handler(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<AnalyticsResponse>> {
    let analytics = state.ability.analytics(&query.learner_id, &query.unit_id).await?;

    Ok(Json(AnalyticsResponse {
        total: analytics.total,
        correct: analytics.correct,
        accuracy: analytics.accuracy,
        ability: analytics.ability,
        difficulty: analytics.difficulty,
        concepts_mastered: analytics.concepts_mastered,
    }))
}

// ===================== GET /healthz =====================

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub index_size: usize,
}

#[utoipa::path(get, path = "/healthz", tag = "health", responses(
    (status = 200, description = "Service health", body = HealthResponse),
))]
async fn healthz_handler(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let index_size = state.embedding_index.size().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        index_size,
    }))
}
