use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{
    AnswerStatus, AnswerWrite, ChoiceId, CompanyId, Pillar, PointId, QuestionId,
    SubmissionTarget,
};
use super::evidence::EvidenceIndex;
use super::service::{
    choice_points, require_company, require_pillar, AssessmentError, AssessmentService,
    ChoicePair, SubmissionScope, ValidationError,
};
use super::store::{AssessmentStore, Ledger};

/// One question of a draft-save batch. An omitted choice clears the selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftItem {
    pub question_id: QuestionId,
    #[serde(default)]
    pub choice_id: Option<ChoiceId>,
    #[serde(default)]
    pub performance_notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSaved {
    pub saved: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftAnswer {
    pub question_id: QuestionId,
    pub choice_id: Option<ChoiceId>,
    pub performance_notes: Option<String>,
    pub status: AnswerStatus,
    pub updated_at: DateTime<Utc>,
}

/// Questionnaire for one pillar as presented to a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillarSheet {
    pub key: String,
    pub name: String,
    pub weight: Option<f64>,
    pub questions: Vec<SheetQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetQuestion {
    pub id: QuestionId,
    pub title: String,
    pub detail: Option<String>,
    pub choices: Vec<SheetChoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetChoice {
    pub id: ChoiceId,
    pub label: String,
    pub score: f64,
    pub point_id: Option<PointId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PillarSubmitted {
    pub updated: usize,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStatus {
    pub completed: bool,
    pub submitted: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    pub total: usize,
    pub answered: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarySubmitted {
    pub submitted_at: DateTime<Utc>,
}

impl<S, V> AssessmentService<S, V>
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    /// Pillar questionnaire with every choice and its raw point score.
    pub fn pillar_sheet(&self, pillar_key: &str) -> Result<PillarSheet, AssessmentError> {
        self.store
            .transaction(|ledger| -> Result<PillarSheet, AssessmentError> {
                let pillar = require_pillar(ledger, pillar_key)?;
                let questions = ledger.questions_in_pillar(pillar.id)?;
                let question_ids: Vec<QuestionId> = questions.iter().map(|q| q.id).collect();
                let choices = ledger.choices_for_questions(&question_ids)?;
                let points = choice_points(ledger, &choices)?;

                let mut by_question: BTreeMap<QuestionId, Vec<SheetChoice>> = BTreeMap::new();
                for choice in choices {
                    by_question
                        .entry(choice.question_id)
                        .or_default()
                        .push(SheetChoice {
                            id: choice.id,
                            score: points.get(&choice.id).copied().unwrap_or_default(),
                            label: choice.label,
                            point_id: choice.point_id,
                        });
                }

                let questions = questions
                    .into_iter()
                    .map(|question| SheetQuestion {
                        choices: by_question.remove(&question.id).unwrap_or_default(),
                        id: question.id,
                        title: question.title,
                        detail: question.description,
                    })
                    .collect();

                debug!(pillar = %pillar.key, "served pillar sheet");
                Ok(PillarSheet {
                    key: pillar.key,
                    name: pillar.name,
                    weight: pillar.weight,
                    questions,
                })
            })
    }

    /// Upserts draft answers for one pillar. The batch is written entirely or not at all.
    pub fn save_draft(
        &self,
        company: CompanyId,
        pillar_key: &str,
        items: &[DraftItem],
    ) -> Result<DraftSaved, AssessmentError> {
        let saved = self
            .store
            .transaction(|ledger| save_draft_in(ledger, company, pillar_key, items))?;

        info!(%company, pillar = pillar_key, saved = saved.saved, "saved draft answers");
        Ok(saved)
    }

    /// Company answers under the pillar, ordered by question id.
    pub fn draft(
        &self,
        company: CompanyId,
        pillar_key: &str,
    ) -> Result<Vec<DraftAnswer>, AssessmentError> {
        self.store
            .transaction(|ledger| -> Result<Vec<DraftAnswer>, AssessmentError> {
                require_company(ledger, company)?;
                let pillar = require_pillar(ledger, pillar_key)?;
                let question_ids = pillar_question_ids(ledger, &pillar)?;

                let mut answers: Vec<DraftAnswer> = ledger
                    .answers(company, &question_ids)?
                    .into_iter()
                    .map(|answer| DraftAnswer {
                        question_id: answer.question_id,
                        choice_id: answer.choice_id,
                        performance_notes: answer.performance_notes,
                        status: answer.status,
                        updated_at: answer.updated_at,
                    })
                    .collect();
                answers.sort_by_key(|answer| answer.question_id);
                Ok(answers)
            })
    }

    /// Freezes every answer of the pillar and records a pillar submission marker.
    ///
    /// Questions never answered get an empty submitted row. There is no completeness check;
    /// only [`Self::submit_summary`] requires every question to be answered.
    pub fn submit(
        &self,
        company: CompanyId,
        pillar_key: &str,
    ) -> Result<PillarSubmitted, AssessmentError> {
        let submitted = self
            .store
            .transaction(|ledger| -> Result<PillarSubmitted, AssessmentError> {
                require_company(ledger, company)?;
                let pillar = require_pillar(ledger, pillar_key)?;
                let question_ids = pillar_question_ids(ledger, &pillar)?;

                for question in &question_ids {
                    ledger.mark_submitted(company, *question)?;
                }
                let marker =
                    ledger.insert_company_submission(company, SubmissionTarget::Pillar(pillar.id))?;

                Ok(PillarSubmitted {
                    updated: question_ids.len(),
                    submitted_at: marker.submitted_at,
                })
            })?;

        info!(
            %company,
            pillar = pillar_key,
            updated = submitted.updated,
            "submitted pillar answers"
        );
        Ok(submitted)
    }

    /// True once the pillar has questions and every one of them is submitted.
    pub fn submission_status(
        &self,
        company: CompanyId,
        pillar_key: &str,
    ) -> Result<bool, AssessmentError> {
        self.store
            .transaction(|ledger| -> Result<bool, AssessmentError> {
                require_company(ledger, company)?;
                let pillar = require_pillar(ledger, pillar_key)?;
                let question_ids = pillar_question_ids(ledger, &pillar)?;
                pillar_locked(ledger, company, &question_ids)
            })
    }

    pub fn summary_status(&self, company: CompanyId) -> Result<SummaryStatus, AssessmentError> {
        self.store
            .transaction(|ledger| -> Result<SummaryStatus, AssessmentError> {
                require_company(ledger, company)?;
                summary_in(ledger, company)
            })
    }

    /// Records a whole-assessment submission once every active question has a selection.
    pub fn submit_summary(&self, company: CompanyId) -> Result<SummarySubmitted, AssessmentError> {
        let submitted = self
            .store
            .transaction(|ledger| -> Result<SummarySubmitted, AssessmentError> {
                require_company(ledger, company)?;
                let status = summary_in(ledger, company)?;
                if !status.completed {
                    warn!(
                        %company,
                        answered = status.answered,
                        total = status.total,
                        "refused incomplete assessment submission"
                    );
                    return Err(ValidationError::AssessmentIncomplete {
                        answered: status.answered,
                        total: status.total,
                    }
                    .into());
                }

                let marker =
                    ledger.insert_company_submission(company, SubmissionTarget::Assessment)?;
                Ok(SummarySubmitted {
                    submitted_at: marker.submitted_at,
                })
            })?;

        info!(%company, "submitted assessment");
        Ok(submitted)
    }
}

fn pillar_question_ids(
    ledger: &dyn Ledger,
    pillar: &Pillar,
) -> Result<Vec<QuestionId>, AssessmentError> {
    Ok(ledger
        .questions_in_pillar(pillar.id)?
        .into_iter()
        .map(|question| question.id)
        .collect())
}

fn pillar_locked(
    ledger: &dyn Ledger,
    company: CompanyId,
    question_ids: &[QuestionId],
) -> Result<bool, AssessmentError> {
    if question_ids.is_empty() {
        return Ok(false);
    }

    let submitted: BTreeSet<QuestionId> = ledger
        .answers(company, question_ids)?
        .into_iter()
        .filter(|answer| answer.is_submitted())
        .map(|answer| answer.question_id)
        .collect();
    Ok(question_ids.iter().all(|id| submitted.contains(id)))
}

fn summary_in(ledger: &dyn Ledger, company: CompanyId) -> Result<SummaryStatus, AssessmentError> {
    let total = ledger.active_question_count()?;
    let answered = ledger
        .company_answers(company)?
        .iter()
        .filter(|answer| answer.choice_id.is_some())
        .count();
    let latest = ledger.latest_company_submission(company, SubmissionTarget::Assessment)?;

    Ok(SummaryStatus {
        completed: total > 0 && answered >= total,
        submitted: latest.is_some(),
        submitted_at: latest.map(|marker| marker.submitted_at),
        total,
        answered,
    })
}

fn save_draft_in(
    ledger: &mut dyn Ledger,
    company: CompanyId,
    pillar_key: &str,
    items: &[DraftItem],
) -> Result<DraftSaved, AssessmentError> {
    require_company(ledger, company)?;
    let pillar = require_pillar(ledger, pillar_key)?;
    let question_ids = pillar_question_ids(ledger, &pillar)?;

    let in_pillar: BTreeSet<QuestionId> = question_ids.iter().copied().collect();
    let outside: BTreeSet<QuestionId> = items
        .iter()
        .map(|item| item.question_id)
        .filter(|id| !in_pillar.contains(id))
        .collect();
    if !outside.is_empty() {
        warn!(%company, pillar = pillar_key, "draft references questions outside the pillar");
        return Err(ValidationError::QuestionsOutsidePillar {
            pillar_key: pillar.key,
            question_ids: outside.into_iter().collect(),
        }
        .into());
    }

    if pillar_locked(ledger, company, &question_ids)? {
        warn!(%company, pillar = pillar_key, "draft refused for submitted pillar");
        return Err(AssessmentError::AlreadySubmitted(SubmissionScope::Pillar {
            pillar_key: pillar.key,
        }));
    }

    let frozen: BTreeSet<QuestionId> = ledger
        .answers(company, &question_ids)?
        .into_iter()
        .filter(|answer| answer.is_submitted())
        .map(|answer| answer.question_id)
        .collect();
    let touched: BTreeSet<QuestionId> = items
        .iter()
        .map(|item| item.question_id)
        .filter(|id| frozen.contains(id))
        .collect();
    if !touched.is_empty() {
        warn!(%company, pillar = pillar_key, "draft targets submitted answers");
        return Err(AssessmentError::AlreadySubmitted(SubmissionScope::Answers {
            question_ids: touched.into_iter().collect(),
        }));
    }

    let chosen: Vec<ChoiceId> = items
        .iter()
        .filter_map(|item| item.choice_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let owners: HashMap<ChoiceId, QuestionId> = ledger
        .choices(&chosen)?
        .into_iter()
        .map(|choice| (choice.id, choice.question_id))
        .collect();
    let mismatched: BTreeSet<ChoicePair> = items
        .iter()
        .filter_map(|item| {
            let choice_id = item.choice_id?;
            match owners.get(&choice_id) {
                Some(owner) if *owner == item.question_id => None,
                _ => Some(ChoicePair {
                    question_id: item.question_id,
                    choice_id,
                }),
            }
        })
        .collect();
    if !mismatched.is_empty() {
        return Err(ValidationError::ChoiceMismatch {
            pairs: mismatched.into_iter().collect(),
        }
        .into());
    }

    for item in items {
        ledger.save_answer(&AnswerWrite {
            company_id: company,
            question_id: item.question_id,
            choice_id: item.choice_id,
            performance_notes: item.performance_notes.clone(),
        })?;
    }

    Ok(DraftSaved { saved: items.len() })
}
