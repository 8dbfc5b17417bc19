use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::assessment::router::{DraftRequest, SUBJECT_HEADER};
use crate::workflows::assessment::{
    assessment_router, error_response, AssessmentError, AssessmentService, MemoryStore,
};

fn router_for(service: Arc<TestService>) -> Router {
    assessment_router(service)
}

fn json_request(method: &str, uri: &str, subject: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(SUBJECT_HEADER, subject)
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn get_request(uri: &str, subject: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(SUBJECT_HEADER, subject)
        .body(Body::empty())
        .expect("request builds")
}

fn draft_body(seeded: &Seeded, level: usize) -> Value {
    let items: Vec<Value> = seeded
        .health
        .iter()
        .map(|question| {
            json!({
                "question_id": question.id,
                "choice_id": question.choices[level],
                "performance_notes": "quarterly reviews",
            })
        })
        .collect();
    json!({ "items": items })
}

#[tokio::test]
async fn save_draft_handler_requires_a_subject() {
    let (service, seeded, _) = build_service();

    let response = crate::workflows::assessment::router::save_draft_handler::<
        MemoryStore,
        MemoryEvidence,
    >(
        State(service),
        Path(HEALTH.to_string()),
        HeaderMap::new(),
        axum::Json(DraftRequest {
            items: picks(&seeded.health, FULL),
        }),
    )
    .await;

    assert_error_response(response, StatusCode::UNAUTHORIZED).await;
}

#[tokio::test]
async fn draft_route_saves_and_lists_answers() {
    let (service, seeded, _) = build_service();
    let router = router_for(service);

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/company/assessments/pillar-1/draft",
            COMPANY_SUBJECT,
            draft_body(&seeded, HALF),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await, json!({ "saved": 2 }));

    let response = router
        .oneshot(get_request(
            "/api/v1/company/assessments/pillar-1/draft",
            COMPANY_SUBJECT,
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let answers = payload.as_array().expect("draft is a list");
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0]["status"], "draft");
    assert_eq!(answers[0]["performance_notes"], "quarterly reviews");
}

#[tokio::test]
async fn draft_route_reports_validation_details() {
    let (service, seeded, _) = build_service();
    let router = router_for(service);

    let body = json!({
        "items": [{
            "question_id": seeded.safety[0].id,
            "choice_id": seeded.safety[0].choices[FULL],
        }]
    });
    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/company/assessments/pillar-1/draft",
            COMPANY_SUBJECT,
            body,
        ))
        .await
        .expect("route executes");

    let payload = assert_error_response(response, StatusCode::UNPROCESSABLE_ENTITY).await;
    assert_eq!(payload["details"]["kind"], "questions_outside_pillar");
    assert_eq!(payload["details"]["pillar_key"], HEALTH);
}

#[tokio::test]
async fn submit_route_locks_the_pillar() {
    let (service, seeded, _) = build_service();
    let router = router_for(service);

    router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/company/assessments/pillar-1/draft",
            COMPANY_SUBJECT,
            draft_body(&seeded, FULL),
        ))
        .await
        .expect("route executes");

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/company/assessments/pillar-1/submit",
            COMPANY_SUBJECT,
            json!({}),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["updated"], 2);

    let response = router
        .clone()
        .oneshot(get_request(
            "/api/v1/company/assessments/pillar-1/submit-status",
            COMPANY_SUBJECT,
        ))
        .await
        .expect("route executes");
    assert_eq!(
        read_json_body(response).await,
        json!({ "pillar_key": HEALTH, "submitted": true })
    );

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/company/assessments/pillar-1/draft",
            COMPANY_SUBJECT,
            draft_body(&seeded, ZERO),
        ))
        .await
        .expect("route executes");
    let payload = assert_error_response(response, StatusCode::CONFLICT).await;
    assert_eq!(payload["details"]["scope"], "pillar");
}

#[tokio::test]
async fn unknown_pillar_is_not_found() {
    let (service, _, _) = build_service();

    let response = router_for(service)
        .oneshot(get_request("/api/v1/catalog/pillars/pillar-9", COMPANY_SUBJECT))
        .await
        .expect("route executes");

    assert_error_response(response, StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn auditor_scores_route_creates_once() {
    let (service, seeded, _) = build_service();
    complete_assessment(&service, &seeded, FULL);
    let router = router_for(service);
    let uri = format!("/api/v1/audit/submissions/{}/scores", seeded.company);
    let body = json!({
        "scores": auditor_picks(&seeded.health, HALF)
            .iter()
            .map(|item| json!({ "question_id": item.question_id, "choice_id": item.choice_id }))
            .collect::<Vec<_>>()
    });

    let response = router
        .clone()
        .oneshot(json_request("POST", &uri, AUDITOR_SUBJECT, body.clone()))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        read_json_body(response).await,
        json!({ "processed": 2, "created": 2, "updated": 0 })
    );

    let response = router
        .clone()
        .oneshot(json_request("POST", &uri, AUDITOR_SUBJECT, body))
        .await
        .expect("route executes");
    let payload = assert_error_response(response, StatusCode::CONFLICT).await;
    assert_eq!(payload["details"]["scope"], "auditor_review");

    let response = router
        .oneshot(json_request(
            "POST",
            &uri,
            SECOND_AUDITOR_SUBJECT,
            json!({ "scores": [] }),
        ))
        .await
        .expect("route executes");
    assert_error_response(response, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn company_subjects_cannot_reach_audit_routes() {
    let (service, _, _) = build_service();

    let response = router_for(service)
        .oneshot(get_request("/api/v1/audit/submissions", COMPANY_SUBJECT))
        .await
        .expect("route executes");

    assert_error_response(response, StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn summary_results_route_reports_stars() {
    let (service, seeded, _) = build_service();
    complete_assessment(&service, &seeded, FULL);

    let response = router_for(service)
        .oneshot(get_request("/api/v1/company/summary/results", COMPANY_SUBJECT))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["overall_score"], 800.0);
    assert_eq!(payload["max_score"], 1000.0);
    assert_eq!(payload["star_count"], 4);
    assert_eq!(payload["pillars"].as_array().map(Vec::len), Some(4));
}

#[tokio::test]
async fn conflicts_are_flagged_retryable() {
    let response = error_response(AssessmentError::Conflict(
        "auditor submission raced".to_string(),
    ));

    let payload = assert_error_response(response, StatusCode::CONFLICT).await;
    assert_eq!(payload["retryable"], true);
}

#[tokio::test]
async fn storage_failures_surface_as_internal_errors() {
    let service = Arc::new(AssessmentService::new(
        Arc::new(UnavailableStore),
        Arc::new(MemoryEvidence::default()),
    ));

    let response = assessment_router(service)
        .oneshot(get_request("/api/v1/catalog/pillars/pillar-1", COMPANY_SUBJECT))
        .await
        .expect("route executes");

    assert_error_response(response, StatusCode::INTERNAL_SERVER_ERROR).await;
}
