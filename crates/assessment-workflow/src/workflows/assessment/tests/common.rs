use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::Response;
use serde_json::Value;

use crate::workflows::assessment::domain::{
    AnswerId, AuditorId, ChoiceId, CompanyId, EvidenceRecord, PillarId, PointId, QuestionId,
    SubjectId,
};
use crate::workflows::assessment::evidence::{EvidenceError, EvidenceIndex};
use crate::workflows::assessment::store::{AssessmentStore, Ledger, MemoryStore, StoreError};
use crate::workflows::assessment::{AssessmentService, AuditorScoreItem, DraftItem};

pub(super) const COMPANY_SUBJECT: &str = "company-user-1";
pub(super) const OTHER_COMPANY_SUBJECT: &str = "company-user-2";
pub(super) const AUDITOR_SUBJECT: &str = "auditor-user-1";
pub(super) const SECOND_AUDITOR_SUBJECT: &str = "auditor-user-2";

pub(super) const HEALTH: &str = "pillar-1";
pub(super) const SAFETY: &str = "pillar-2";
pub(super) const COMMUNITY: &str = "pillar-3";
pub(super) const MANAGEMENT: &str = "pillar-4";

/// Index of each canonical point inside [`SeededQuestion::choices`].
pub(super) const ZERO: usize = 0;
pub(super) const HALF: usize = 2;
pub(super) const FULL: usize = 4;

pub(super) type TestService = AssessmentService<MemoryStore, MemoryEvidence>;

/// Question with one choice per canonical point (0, .25, .5, .75, 1) plus a choice that
/// carries no point.
#[derive(Debug, Clone)]
pub(super) struct SeededQuestion {
    pub(super) id: QuestionId,
    pub(super) choices: Vec<ChoiceId>,
    pub(super) unscored: ChoiceId,
}

/// Four pillars weighted 300/300/200/200 with 2, 2, 1 and 0 questions.
#[derive(Debug, Clone)]
pub(super) struct Seeded {
    pub(super) company: CompanyId,
    pub(super) other_company: CompanyId,
    pub(super) auditor: AuditorId,
    pub(super) second_auditor: AuditorId,
    pub(super) points: Vec<PointId>,
    pub(super) health: Vec<SeededQuestion>,
    pub(super) safety: Vec<SeededQuestion>,
    pub(super) community: Vec<SeededQuestion>,
    pub(super) management: PillarId,
}

impl Seeded {
    pub(super) fn all_questions(&self) -> Vec<&SeededQuestion> {
        self.health
            .iter()
            .chain(self.safety.iter())
            .chain(self.community.iter())
            .collect()
    }
}

fn add_question(
    ledger: &mut dyn Ledger,
    pillar: PillarId,
    title: &str,
    points: &[PointId],
) -> Result<SeededQuestion, StoreError> {
    let id = ledger.insert_question(pillar, title, Some("Describe the supporting practice"))?;
    let labels = ["Not started", "Initiated", "Partial", "Established", "Fully embedded"];
    let mut choices = Vec::with_capacity(points.len());
    for (label, point) in labels.iter().zip(points) {
        choices.push(ledger.insert_choice(id, label, Some(*point))?);
    }
    let unscored = ledger.insert_choice(id, "Not applicable", None)?;
    Ok(SeededQuestion {
        id,
        choices,
        unscored,
    })
}

pub(super) fn seed<S: AssessmentStore>(store: &S) -> Seeded {
    store
        .transaction(|ledger| -> Result<Seeded, StoreError> {
            let company = ledger.insert_company("Acme Foods", Some(&SubjectId::new(COMPANY_SUBJECT)))?;
            let other_company =
                ledger.insert_company("Borealis Steel", Some(&SubjectId::new(OTHER_COMPANY_SUBJECT)))?;
            let auditor = ledger.insert_auditor(&SubjectId::new(AUDITOR_SUBJECT))?;
            let second_auditor = ledger.insert_auditor(&SubjectId::new(SECOND_AUDITOR_SUBJECT))?;

            let mut points = Vec::new();
            for score in [0.0, 0.25, 0.5, 0.75, 1.0] {
                points.push(ledger.insert_point(score)?);
            }

            let health = ledger
                .upsert_pillar(HEALTH, "Health Promotion (H1)", Some(300.0))?
                .id();
            let safety = ledger
                .upsert_pillar(SAFETY, "Industrial Safety & Environment (I2)", Some(300.0))?
                .id();
            let community = ledger
                .upsert_pillar(COMMUNITY, "Community Engagement (C3)", Some(200.0))?
                .id();
            let management = ledger
                .upsert_pillar(MANAGEMENT, "Management & Sustainability (M4)", Some(200.0))?
                .id();

            Ok(Seeded {
                company,
                other_company,
                auditor,
                second_auditor,
                health: vec![
                    add_question(ledger, health, "Workplace health policy", &points)?,
                    add_question(ledger, health, "Annual health screening", &points)?,
                ],
                safety: vec![
                    add_question(ledger, safety, "Hazard register maintained", &points)?,
                    add_question(ledger, safety, "Emergency drills", &points)?,
                ],
                community: vec![add_question(
                    ledger,
                    community,
                    "Community health outreach",
                    &points,
                )?],
                management,
                points,
            })
        })
        .expect("catalog seeds")
}

pub(super) fn build_service() -> (Arc<TestService>, Seeded, Arc<MemoryEvidence>) {
    let store = Arc::new(MemoryStore::new());
    let seeded = seed(store.as_ref());
    let evidence = Arc::new(MemoryEvidence::default());
    let service = Arc::new(AssessmentService::new(store, evidence.clone()));
    (service, seeded, evidence)
}

pub(super) fn picks(questions: &[SeededQuestion], level: usize) -> Vec<DraftItem> {
    questions
        .iter()
        .map(|question| DraftItem {
            question_id: question.id,
            choice_id: Some(question.choices[level]),
            performance_notes: Some(format!("evidence for question {}", question.id)),
        })
        .collect()
}

pub(super) fn auditor_picks(questions: &[SeededQuestion], level: usize) -> Vec<AuditorScoreItem> {
    questions
        .iter()
        .map(|question| AuditorScoreItem {
            question_id: question.id,
            choice_id: question.choices[level],
        })
        .collect()
}

/// Answers every seeded question at `level` and submits each non-empty pillar.
pub(super) fn complete_assessment(service: &TestService, seeded: &Seeded, level: usize) {
    for (key, questions) in [
        (HEALTH, &seeded.health),
        (SAFETY, &seeded.safety),
        (COMMUNITY, &seeded.community),
    ] {
        service
            .save_draft(seeded.company, key, &picks(questions, level))
            .expect("draft saves");
        service.submit(seeded.company, key).expect("pillar submits");
    }
}

#[derive(Default)]
pub(super) struct MemoryEvidence {
    records: Mutex<HashMap<AnswerId, Vec<EvidenceRecord>>>,
}

impl MemoryEvidence {
    pub(super) fn attach(&self, answer: AnswerId, record: EvidenceRecord) {
        self.records
            .lock()
            .expect("evidence mutex poisoned")
            .entry(answer)
            .or_default()
            .push(record);
    }
}

impl EvidenceIndex for MemoryEvidence {
    fn evidence(&self, answer: AnswerId) -> Result<Vec<EvidenceRecord>, EvidenceError> {
        let guard = self.records.lock().expect("evidence mutex poisoned");
        Ok(guard.get(&answer).cloned().unwrap_or_default())
    }
}

/// Store whose every transaction fails before touching data.
pub(super) struct UnavailableStore;

impl AssessmentStore for UnavailableStore {
    fn transaction<T, E, F>(&self, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Ledger) -> Result<T, E>,
        E: From<StoreError>,
    {
        Err(E::from(StoreError::Unavailable("database offline".to_string())))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("valid json")
}

pub(super) async fn assert_error_response(response: Response, status: StatusCode) -> Value {
    assert_eq!(response.status(), status);
    let payload = read_json_body(response).await;
    assert!(payload.get("error").and_then(Value::as_str).is_some());
    payload
}
