use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use super::domain::{
    Auditor, AuditorId, Choice, ChoiceId, Company, CompanyId, Pillar, PointId, QuestionId,
    SubjectId,
};
use super::evidence::{EvidenceError, EvidenceIndex};
use super::scoring::ScoringEngine;
use super::store::{AssessmentStore, Ledger, StoreError};

/// Service composing the store, the evidence collaborator, and the scoring engine.
///
/// Operations are grouped by concern: company answers (`answers`), auditor review
/// (`audit`) and scoring (`results`). Each one runs in a single store transaction.
pub struct AssessmentService<S, V> {
    pub(super) store: Arc<S>,
    pub(super) evidence: Arc<V>,
    pub(super) engine: ScoringEngine,
}

impl<S, V> AssessmentService<S, V>
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    pub fn new(store: Arc<S>, evidence: Arc<V>) -> Self {
        Self {
            store,
            evidence,
            engine: ScoringEngine::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Resolves a verified subject to the company it acts for.
    pub fn company_for_subject(&self, subject: &SubjectId) -> Result<CompanyId, AssessmentError> {
        if subject.is_blank() {
            return Err(AssessmentError::Unauthorized);
        }

        let company = self
            .store
            .transaction(|ledger| ledger.company_by_subject(subject))
            .map_err(AssessmentError::from)?;
        company
            .map(|company| company.id)
            .ok_or_else(|| AssessmentError::not_found("company", subject))
    }

    /// Resolves a verified subject to its auditor record.
    pub fn auditor_for_subject(&self, subject: &SubjectId) -> Result<AuditorId, AssessmentError> {
        if subject.is_blank() {
            return Err(AssessmentError::Unauthorized);
        }

        let auditor = self
            .store
            .transaction(|ledger| ledger.auditor_by_subject(subject))
            .map_err(AssessmentError::from)?;
        auditor
            .map(|auditor| auditor.id)
            .ok_or_else(|| AssessmentError::not_found("auditor", subject))
    }
}

pub(super) fn require_company(
    ledger: &dyn Ledger,
    company: CompanyId,
) -> Result<Company, AssessmentError> {
    ledger
        .company(company)?
        .ok_or_else(|| AssessmentError::not_found("company", company))
}

pub(super) fn require_auditor(
    ledger: &dyn Ledger,
    auditor: AuditorId,
) -> Result<Auditor, AssessmentError> {
    ledger
        .auditor(auditor)?
        .ok_or_else(|| AssessmentError::not_found("auditor", auditor))
}

pub(super) fn require_pillar(ledger: &dyn Ledger, key: &str) -> Result<Pillar, AssessmentError> {
    ledger
        .pillar_by_key(key)?
        .ok_or_else(|| AssessmentError::not_found("pillar", key))
}

/// Raw point score per choice, for the choices whose point still resolves.
pub(super) fn choice_points(
    ledger: &dyn Ledger,
    choices: &[Choice],
) -> Result<HashMap<ChoiceId, f64>, StoreError> {
    let point_ids: Vec<PointId> = choices
        .iter()
        .filter_map(|choice| choice.point_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let points: HashMap<PointId, f64> = ledger
        .points(&point_ids)?
        .into_iter()
        .map(|point| (point.id, point.score))
        .collect();

    Ok(choices
        .iter()
        .filter_map(|choice| {
            let score = points.get(&choice.point_id?)?;
            Some((choice.id, *score))
        })
        .collect())
}

/// Which submitted state blocked a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "scope")]
pub enum SubmissionScope {
    Pillar {
        pillar_key: String,
    },
    Answers {
        question_ids: Vec<QuestionId>,
    },
    AuditorReview {
        auditor_id: AuditorId,
        company_id: CompanyId,
    },
}

impl fmt::Display for SubmissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionScope::Pillar { pillar_key } => {
                write!(f, "pillar '{pillar_key}' is already submitted")
            }
            SubmissionScope::Answers { question_ids } => {
                write!(f, "answers for questions {} are already submitted", id_list(question_ids))
            }
            SubmissionScope::AuditorReview {
                auditor_id,
                company_id,
            } => write!(
                f,
                "auditor {auditor_id} already submitted scores for company {company_id}"
            ),
        }
    }
}

/// Question/choice pair whose choice does not belong to the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ChoicePair {
    pub question_id: QuestionId,
    pub choice_id: ChoiceId,
}

impl fmt::Display for ChoicePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.question_id, self.choice_id)
    }
}

/// Cross-reference failures. Each one aborts the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ValidationError {
    #[error("questions {} do not belong to pillar '{pillar_key}'", id_list(.question_ids))]
    QuestionsOutsidePillar {
        pillar_key: String,
        question_ids: Vec<QuestionId>,
    },
    #[error("choices do not belong to their questions: {}", id_list(.pairs))]
    ChoiceMismatch { pairs: Vec<ChoicePair> },
    #[error("choices {} do not exist", id_list(.choice_ids))]
    UnknownChoices { choice_ids: Vec<ChoiceId> },
    #[error("company has no answers for questions {}", id_list(.question_ids))]
    QuestionsNotInPlay { question_ids: Vec<QuestionId> },
    #[error("assessment incomplete: {answered} of {total} questions answered")]
    AssessmentIncomplete { answered: usize, total: usize },
}

fn id_list<T: fmt::Display>(ids: &[T]) -> String {
    let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
    format!("[{}]", rendered.join(", "))
}

/// Error raised by the assessment service.
#[derive(Debug, thiserror::Error)]
pub enum AssessmentError {
    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    AlreadySubmitted(SubmissionScope),
    #[error("{operation} requires at least one item")]
    EmptyBatch { operation: &'static str },
    #[error("concurrent write conflict: {0}")]
    Conflict(String),
    #[error("caller identity is missing")]
    Unauthorized,
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
    #[error(transparent)]
    Evidence(#[from] EvidenceError),
}

impl AssessmentError {
    pub(super) fn not_found(entity: &'static str, key: impl fmt::Display) -> Self {
        AssessmentError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Conflicts come from racing writers; the same request may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AssessmentError::Conflict(_))
    }
}

impl From<StoreError> for AssessmentError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(detail) => AssessmentError::Conflict(detail),
            StoreError::Locked { answer, question } => {
                warn!(%answer, %question, "write refused by submitted answer");
                AssessmentError::AlreadySubmitted(SubmissionScope::Answers {
                    question_ids: vec![question],
                })
            }
            other => AssessmentError::Storage(other),
        }
    }
}
