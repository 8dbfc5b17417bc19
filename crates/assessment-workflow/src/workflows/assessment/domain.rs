use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Company record owning a set of answers.
    CompanyId
);
record_id!(
    /// Auditor record re-scoring company answers.
    AuditorId
);
record_id!(PillarId);
record_id!(
    /// Catalog question (an "assessment" item inside a pillar).
    QuestionId
);
record_id!(
    /// Selectable answer to a question (an evaluation criterion).
    ChoiceId
);
record_id!(PointId);
record_id!(
    /// Company answer row; auditors key their scores on it.
    AnswerId
);
record_id!(AuditorScoreId);
record_id!(SubmissionId);

/// Verified caller identity supplied by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Soft-delete marker carried by every stored row. Reads only ever surface `Active` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum Lifecycle {
    #[default]
    Active,
    Deleted {
        at: DateTime<Utc>,
    },
}

impl Lifecycle {
    pub fn from_deleted_at(deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            Some(at) => Lifecycle::Deleted { at },
            None => Lifecycle::Active,
        }
    }

    pub const fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }

    pub const fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Lifecycle::Active => None,
            Lifecycle::Deleted { at } => Some(*at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub subject: Option<SubjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auditor {
    pub id: AuditorId,
    pub subject: SubjectId,
}

/// Top-level scored category. `weight` is the share of the overall score the pillar
/// contributes; pillars without a positive weight are scored on their raw total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pillar {
    pub id: PillarId,
    pub key: String,
    pub name: String,
    pub weight: Option<f64>,
}

impl Pillar {
    pub fn effective_weight(&self) -> Option<f64> {
        self.weight.filter(|weight| *weight > 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub pillar_id: PillarId,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: ChoiceId,
    pub question_id: QuestionId,
    pub label: String,
    pub point_id: Option<PointId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub score: f64,
}

/// Lifecycle of a company answer. The only legal transition is `Draft -> Submitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Draft,
    Submitted,
}

impl AnswerStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AnswerStatus::Draft => "draft",
            AnswerStatus::Submitted => "submitted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(AnswerStatus::Draft),
            "submitted" => Some(AnswerStatus::Submitted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyAnswer {
    pub id: AnswerId,
    pub company_id: CompanyId,
    pub question_id: QuestionId,
    pub choice_id: Option<ChoiceId>,
    pub performance_notes: Option<String>,
    pub status: AnswerStatus,
    pub updated_at: DateTime<Utc>,
}

impl CompanyAnswer {
    pub fn is_submitted(&self) -> bool {
        self.status == AnswerStatus::Submitted
    }
}

/// Draft-save write applied by the answer ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerWrite {
    pub company_id: CompanyId,
    pub question_id: QuestionId,
    pub choice_id: Option<ChoiceId>,
    pub performance_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorScore {
    pub id: AuditorScoreId,
    pub auditor_id: AuditorId,
    pub company_id: CompanyId,
    pub question_id: QuestionId,
    pub answer_id: AnswerId,
    pub choice_id: ChoiceId,
    pub updated_at: DateTime<Utc>,
}

/// What a company submission marker closes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "pillar_id")]
pub enum SubmissionTarget {
    Pillar(PillarId),
    Assessment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySubmission {
    pub id: SubmissionId,
    pub company_id: CompanyId,
    pub target: SubmissionTarget,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorSubmission {
    pub id: SubmissionId,
    pub auditor_id: AuditorId,
    pub company_id: CompanyId,
    pub submitted_at: DateTime<Utc>,
}

/// Memoized weighted pillar score. Recomputed on every scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PillarResult {
    pub company_id: CompanyId,
    pub pillar_id: PillarId,
    pub score: f64,
}

/// Outcome of an upsert keyed by a natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted<I> {
    Created(I),
    Updated(I),
}

impl<I: Copy> Upserted<I> {
    pub fn id(&self) -> I {
        match self {
            Upserted::Created(id) | Upserted::Updated(id) => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Upserted::Created(_))
    }
}

/// Row addressed by a soft delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRef {
    Company(CompanyId),
    Auditor(AuditorId),
    Pillar(PillarId),
    Question(QuestionId),
    Choice(ChoiceId),
    Point(PointId),
    Answer(AnswerId),
    AuditorScore(AuditorScoreId),
    CompanySubmission(SubmissionId),
    AuditorSubmission(SubmissionId),
}

/// Stored evidence reference as handed over by the file collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub url: Option<String>,
    pub file_path: Option<String>,
}

impl EvidenceRecord {
    /// Link shown to reviewers: the stored URL, else the public upload path of the file.
    pub fn public_url(&self) -> Option<String> {
        if let Some(url) = self.url.as_deref().filter(|url| !url.trim().is_empty()) {
            return Some(url.to_string());
        }

        let file_name = Path::new(self.file_path.as_deref()?).file_name()?;
        Some(format!("/uploads/evidence/{}", file_name.to_string_lossy()))
    }
}
