use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::answers::DraftItem;
use super::audit::AuditorScoreItem;
use super::domain::{AuditorId, CompanyId, SubjectId};
use super::evidence::EvidenceIndex;
use super::service::{AssessmentError, AssessmentService};
use super::store::{AssessmentStore, StoreError};

/// Header carrying the verified caller subject set by the authentication layer.
pub const SUBJECT_HEADER: &str = "x-subject-id";

type SharedService<S, V> = Arc<AssessmentService<S, V>>;

#[derive(Debug, Clone, Deserialize)]
pub struct DraftRequest {
    pub items: Vec<DraftItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditorScoresRequest {
    pub scores: Vec<AuditorScoreItem>,
}

/// Router builder exposing the company, catalog and audit endpoints.
pub fn assessment_router<S, V>(service: SharedService<S, V>) -> Router
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    Router::new()
        .route(
            "/api/v1/catalog/pillars/:pillar_key",
            get(pillar_sheet_handler::<S, V>),
        )
        .route(
            "/api/v1/company/assessments/:pillar_key/draft",
            get(draft_handler::<S, V>).post(save_draft_handler::<S, V>),
        )
        .route(
            "/api/v1/company/assessments/:pillar_key/submit",
            post(submit_handler::<S, V>),
        )
        .route(
            "/api/v1/company/assessments/:pillar_key/submit-status",
            get(submission_status_handler::<S, V>),
        )
        .route(
            "/api/v1/company/assessments/:pillar_key/score",
            get(pillar_score_handler::<S, V>),
        )
        .route(
            "/api/v1/company/summary/status",
            get(summary_status_handler::<S, V>),
        )
        .route(
            "/api/v1/company/summary/submit",
            post(submit_summary_handler::<S, V>),
        )
        .route(
            "/api/v1/company/summary/results",
            get(overall_handler::<S, V>),
        )
        .route(
            "/api/v1/audit/submissions",
            get(list_submissions_handler::<S, V>),
        )
        .route(
            "/api/v1/audit/submissions/:company_id",
            get(submission_detail_handler::<S, V>),
        )
        .route(
            "/api/v1/audit/submissions/:company_id/scores",
            post(submit_auditor_scores_handler::<S, V>),
        )
        .route(
            "/api/v1/audit/submissions/:company_id/auditor-scores",
            get(auditor_scores_handler::<S, V>),
        )
        .route(
            "/api/v1/audit/submissions/:company_id/auditor-results",
            get(auditor_results_handler::<S, V>),
        )
        .with_state(service)
}

pub(crate) async fn pillar_sheet_handler<S, V>(
    State(service): State<SharedService<S, V>>,
    Path(pillar_key): Path<String>,
) -> Response
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    let result = blocking(move || service.pillar_sheet(&pillar_key)).await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn draft_handler<S, V>(
    State(service): State<SharedService<S, V>>,
    Path(pillar_key): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    let result = blocking(move || {
        calling_company(&service, &headers).and_then(|company| service.draft(company, &pillar_key))
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn save_draft_handler<S, V>(
    State(service): State<SharedService<S, V>>,
    Path(pillar_key): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<DraftRequest>,
) -> Response
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    let result = blocking(move || {
        calling_company(&service, &headers)
            .and_then(|company| service.save_draft(company, &pillar_key, &request.items))
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn submit_handler<S, V>(
    State(service): State<SharedService<S, V>>,
    Path(pillar_key): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    let result = blocking(move || {
        calling_company(&service, &headers).and_then(|company| service.submit(company, &pillar_key))
    })
    .await;
    respond(StatusCode::OK, result)
}

#[derive(Debug, Serialize)]
struct SubmissionStatusView {
    pillar_key: String,
    submitted: bool,
}

pub(crate) async fn submission_status_handler<S, V>(
    State(service): State<SharedService<S, V>>,
    Path(pillar_key): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    let result = blocking(move || {
        calling_company(&service, &headers)
            .and_then(|company| service.submission_status(company, &pillar_key))
            .map(|submitted| SubmissionStatusView {
                pillar_key,
                submitted,
            })
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn pillar_score_handler<S, V>(
    State(service): State<SharedService<S, V>>,
    Path(pillar_key): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    let result = blocking(move || {
        calling_company(&service, &headers)
            .and_then(|company| service.compute_pillar_score(company, &pillar_key))
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn summary_status_handler<S, V>(
    State(service): State<SharedService<S, V>>,
    headers: HeaderMap,
) -> Response
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    let result = blocking(move || {
        calling_company(&service, &headers).and_then(|company| service.summary_status(company))
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn submit_summary_handler<S, V>(
    State(service): State<SharedService<S, V>>,
    headers: HeaderMap,
) -> Response
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    let result = blocking(move || {
        calling_company(&service, &headers).and_then(|company| service.submit_summary(company))
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn overall_handler<S, V>(
    State(service): State<SharedService<S, V>>,
    headers: HeaderMap,
) -> Response
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    let result = blocking(move || {
        calling_company(&service, &headers).and_then(|company| service.compute_overall(company))
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn list_submissions_handler<S, V>(
    State(service): State<SharedService<S, V>>,
    headers: HeaderMap,
) -> Response
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    let result = blocking(move || {
        calling_auditor(&service, &headers).and_then(|_| service.list_submissions())
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn submission_detail_handler<S, V>(
    State(service): State<SharedService<S, V>>,
    Path(company_id): Path<i64>,
    headers: HeaderMap,
) -> Response
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    let result = blocking(move || {
        calling_auditor(&service, &headers)
            .and_then(|auditor| service.submission_detail(Some(auditor), CompanyId(company_id)))
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn submit_auditor_scores_handler<S, V>(
    State(service): State<SharedService<S, V>>,
    Path(company_id): Path<i64>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<AuditorScoresRequest>,
) -> Response
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    let result = blocking(move || {
        calling_auditor(&service, &headers).and_then(|auditor| {
            service.submit_auditor_scores(auditor, CompanyId(company_id), &request.scores)
        })
    })
    .await;
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn auditor_scores_handler<S, V>(
    State(service): State<SharedService<S, V>>,
    Path(company_id): Path<i64>,
    headers: HeaderMap,
) -> Response
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    let result = blocking(move || {
        calling_auditor(&service, &headers)
            .and_then(|auditor| service.auditor_scores(auditor, CompanyId(company_id)))
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn auditor_results_handler<S, V>(
    State(service): State<SharedService<S, V>>,
    Path(company_id): Path<i64>,
    headers: HeaderMap,
) -> Response
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    let result = blocking(move || {
        calling_auditor(&service, &headers)
            .and_then(|auditor| service.auditor_results(auditor, CompanyId(company_id)))
    })
    .await;
    respond(StatusCode::OK, result)
}

/// Service calls hold the store lock and may wait on SQLite's busy handler, so they run on
/// the blocking pool instead of a runtime worker.
async fn blocking<T, F>(work: F) -> Result<T, AssessmentError>
where
    F: FnOnce() -> Result<T, AssessmentError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|err| {
        AssessmentError::Storage(StoreError::Unavailable(format!(
            "blocking task failed: {err}"
        )))
    })?
}

fn caller_subject(headers: &HeaderMap) -> Result<SubjectId, AssessmentError> {
    headers
        .get(SUBJECT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(SubjectId::new)
        .filter(|subject| !subject.is_blank())
        .ok_or(AssessmentError::Unauthorized)
}

fn calling_company<S, V>(
    service: &AssessmentService<S, V>,
    headers: &HeaderMap,
) -> Result<CompanyId, AssessmentError>
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    service.company_for_subject(&caller_subject(headers)?)
}

fn calling_auditor<S, V>(
    service: &AssessmentService<S, V>,
    headers: &HeaderMap,
) -> Result<AuditorId, AssessmentError>
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    service.auditor_for_subject(&caller_subject(headers)?)
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, AssessmentError>) -> Response {
    match result {
        Ok(view) => (status, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

/// Maps a service error onto its HTTP status and JSON body.
pub fn error_response(error: AssessmentError) -> Response {
    match &error {
        AssessmentError::NotFound { .. } => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        AssessmentError::Validation(validation) => {
            let payload = json!({
                "error": error.to_string(),
                "details": validation,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        AssessmentError::AlreadySubmitted(scope) => {
            let payload = json!({
                "error": error.to_string(),
                "details": scope,
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        AssessmentError::EmptyBatch { .. } => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        }
        AssessmentError::Conflict(_) => {
            let payload = json!({
                "error": error.to_string(),
                "retryable": error.is_retryable(),
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        AssessmentError::Unauthorized => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
        }
        AssessmentError::Storage(_) | AssessmentError::Evidence(_) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
