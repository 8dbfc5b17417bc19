//! Persistence seam for the assessment workflow.
//!
//! Every workflow operation runs inside [`AssessmentStore::transaction`], which hands the
//! closure a [`Ledger`] covering the catalog, both answer ledgers, submission markers, and
//! the pillar result cache. Work is committed only when the closure returns `Ok`; any error
//! discards every write made through the ledger.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use super::domain::{
    AnswerId, AnswerWrite, Auditor, AuditorId, AuditorScore, AuditorScoreId, AuditorSubmission,
    Choice, ChoiceId, Company, CompanyAnswer, CompanyId, CompanySubmission, Pillar, PillarId,
    PillarResult, Point, PointId, Question, QuestionId, RecordRef, SubjectId, SubmissionTarget,
    Upserted,
};

/// Unit-of-work boundary shared by the SQLite and in-memory stores.
pub trait AssessmentStore: Send + Sync {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Ledger) -> Result<T, E>,
        E: From<StoreError>;
}

/// Reads and writes available inside a transaction. Reads never return soft-deleted rows
/// and list results are ordered by id.
pub trait Ledger {
    fn insert_company(
        &mut self,
        name: &str,
        subject: Option<&SubjectId>,
    ) -> Result<CompanyId, StoreError>;
    fn insert_auditor(&mut self, subject: &SubjectId) -> Result<AuditorId, StoreError>;
    fn company(&self, id: CompanyId) -> Result<Option<Company>, StoreError>;
    fn company_by_subject(&self, subject: &SubjectId) -> Result<Option<Company>, StoreError>;
    fn auditor(&self, id: AuditorId) -> Result<Option<Auditor>, StoreError>;
    fn auditor_by_subject(&self, subject: &SubjectId) -> Result<Option<Auditor>, StoreError>;

    fn upsert_pillar(
        &mut self,
        key: &str,
        name: &str,
        weight: Option<f64>,
    ) -> Result<Upserted<PillarId>, StoreError>;
    fn insert_question(
        &mut self,
        pillar: PillarId,
        title: &str,
        description: Option<&str>,
    ) -> Result<QuestionId, StoreError>;
    fn insert_point(&mut self, score: f64) -> Result<PointId, StoreError>;
    fn insert_choice(
        &mut self,
        question: QuestionId,
        label: &str,
        point: Option<PointId>,
    ) -> Result<ChoiceId, StoreError>;
    fn pillars(&self) -> Result<Vec<Pillar>, StoreError>;
    fn pillar_by_key(&self, key: &str) -> Result<Option<Pillar>, StoreError>;
    fn questions_in_pillar(&self, pillar: PillarId) -> Result<Vec<Question>, StoreError>;
    fn active_question_count(&self) -> Result<usize, StoreError>;
    fn choices(&self, ids: &[ChoiceId]) -> Result<Vec<Choice>, StoreError>;
    fn choices_for_questions(&self, questions: &[QuestionId]) -> Result<Vec<Choice>, StoreError>;
    fn points(&self, ids: &[PointId]) -> Result<Vec<Point>, StoreError>;
    fn all_points(&self) -> Result<Vec<Point>, StoreError>;

    fn answers(
        &self,
        company: CompanyId,
        questions: &[QuestionId],
    ) -> Result<Vec<CompanyAnswer>, StoreError>;
    fn company_answers(&self, company: CompanyId) -> Result<Vec<CompanyAnswer>, StoreError>;
    /// Upserts a draft answer. Fails with [`StoreError::Locked`] when the existing row is
    /// already submitted.
    fn save_answer(&mut self, write: &AnswerWrite) -> Result<Upserted<AnswerId>, StoreError>;
    /// Moves the answer to `submitted`, creating an empty submitted row when none exists.
    fn mark_submitted(
        &mut self,
        company: CompanyId,
        question: QuestionId,
    ) -> Result<Upserted<AnswerId>, StoreError>;

    fn insert_company_submission(
        &mut self,
        company: CompanyId,
        target: SubmissionTarget,
    ) -> Result<CompanySubmission, StoreError>;
    fn latest_company_submission(
        &self,
        company: CompanyId,
        target: SubmissionTarget,
    ) -> Result<Option<CompanySubmission>, StoreError>;
    /// Whole-assessment submissions across all companies, newest first per company.
    fn assessment_submissions(&self) -> Result<Vec<CompanySubmission>, StoreError>;

    fn auditor_scores(
        &self,
        auditor: AuditorId,
        company: CompanyId,
    ) -> Result<Vec<AuditorScore>, StoreError>;
    fn upsert_auditor_score(
        &mut self,
        auditor: AuditorId,
        answer: &CompanyAnswer,
        choice: ChoiceId,
    ) -> Result<Upserted<AuditorScoreId>, StoreError>;
    /// Fails with [`StoreError::Conflict`] when an active marker exists for the pair.
    fn insert_auditor_submission(
        &mut self,
        auditor: AuditorId,
        company: CompanyId,
    ) -> Result<AuditorSubmission, StoreError>;
    fn latest_auditor_submission(
        &self,
        auditor: AuditorId,
        company: CompanyId,
    ) -> Result<Option<AuditorSubmission>, StoreError>;

    fn upsert_pillar_result(
        &mut self,
        company: CompanyId,
        pillar: PillarId,
        score: f64,
    ) -> Result<(), StoreError>;
    fn pillar_results(&self, company: CompanyId) -> Result<Vec<PillarResult>, StoreError>;

    /// Stamps the delete marker; returns `false` when the row was absent or already deleted.
    fn soft_delete(&mut self, target: RecordRef) -> Result<bool, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A competing writer won: a unique key was taken or the database lock could not be
    /// acquired within the busy timeout. The same unit of work may succeed on retry.
    #[error("concurrent write rejected: {0}")]
    Conflict(String),
    #[error("answer {answer} to question {question} is submitted and can no longer change")]
    Locked {
        answer: AnswerId,
        question: QuestionId,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &value {
            rusqlite::Error::SqliteFailure(failure, message) => match failure.code {
                ErrorCode::ConstraintViolation
                    if failure.extended_code != rusqlite::ffi::SQLITE_CONSTRAINT_TRIGGER =>
                {
                    StoreError::Conflict(
                        message
                            .clone()
                            .unwrap_or_else(|| "constraint violation".to_string()),
                    )
                }
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    StoreError::Conflict(format!("database is busy: {value}"))
                }
                _ => StoreError::Unavailable(value.to_string()),
            },
            _ => StoreError::Unavailable(value.to_string()),
        }
    }
}
