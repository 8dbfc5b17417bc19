//! Compliance assessment scoring and submission workflow.
//!
//! Companies answer a weighted questionnaire organized into pillars and submit it pillar
//! by pillar; auditors record independent selections once per company; the scoring
//! engine turns point-valued selections into weighted pillar scores and a star rating.

mod answers;
mod audit;
pub mod domain;
pub mod evidence;
mod results;
pub mod router;
pub mod scoring;
mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use answers::{
    DraftAnswer, DraftItem, DraftSaved, PillarSheet, PillarSubmitted, SheetChoice, SheetQuestion,
    SummaryStatus, SummarySubmitted,
};
pub use audit::{
    AuditorScoreItem, AuditorScoreView, AuditorScoresSubmitted, DetailOption, DetailPillar,
    DetailQuestion, SubmissionDetail, SubmissionSummary,
};
pub use domain::{
    AnswerId, AnswerStatus, AuditorId, ChoiceId, CompanyId, EvidenceRecord, PillarId, PointId,
    QuestionId, SubjectId,
};
pub use evidence::{EvidenceError, EvidenceIndex, NoEvidence};
pub use router::{assessment_router, error_response, SUBJECT_HEADER};
pub use scoring::{OverallResult, PillarScore, PointScore, ScoringEngine};
pub use service::{AssessmentError, AssessmentService, ChoicePair, SubmissionScope, ValidationError};
pub use store::{AssessmentStore, Ledger, MemoryStore, SqliteStore, StoreError};
