use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{
    AnswerId, AnswerStatus, AuditorId, ChoiceId, CompanyAnswer, CompanyId, PillarId, QuestionId,
    SubmissionTarget, Upserted,
};
use super::evidence::EvidenceIndex;
use super::scoring::round2;
use super::service::{
    choice_points, require_auditor, require_company, AssessmentError, AssessmentService,
    ChoicePair, SubmissionScope, ValidationError,
};
use super::store::{AssessmentStore, Ledger};

/// Auditor selection for one company question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorScoreItem {
    pub question_id: QuestionId,
    pub choice_id: ChoiceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorScoresSubmitted {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditorScoreView {
    pub question_id: QuestionId,
    pub company_question_id: AnswerId,
    pub choice_id: ChoiceId,
    pub score: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// Latest whole-assessment submission of one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionSummary {
    pub company_id: CompanyId,
    pub company_name: String,
    pub submitted_at: DateTime<Utc>,
    pub status: AnswerStatus,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionDetail {
    pub company_id: CompanyId,
    pub company_name: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub overall_score: f64,
    pub auditor_submitted: bool,
    pub auditor_submitted_at: Option<DateTime<Utc>>,
    pub pillars: Vec<DetailPillar>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailPillar {
    pub pillar_id: PillarId,
    pub key: String,
    pub name: String,
    pub weight: Option<f64>,
    pub questions: Vec<DetailQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailQuestion {
    pub question_id: QuestionId,
    pub title: String,
    pub detail: Option<String>,
    pub answer_id: Option<AnswerId>,
    pub status: Option<AnswerStatus>,
    pub performance_notes: Option<String>,
    pub selected_choice_id: Option<ChoiceId>,
    pub selected_label: Option<String>,
    pub selected_score: Option<f64>,
    pub options: Vec<DetailOption>,
    pub evidence: Vec<String>,
    pub auditor_choice_id: Option<ChoiceId>,
    pub auditor_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailOption {
    pub choice_id: ChoiceId,
    pub label: String,
    pub score: Option<f64>,
    pub selected: bool,
}

impl<S, V> AssessmentService<S, V>
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    /// Records an auditor's independent selections together with the one-time review
    /// marker for the (auditor, company) pair.
    pub fn submit_auditor_scores(
        &self,
        auditor: AuditorId,
        company: CompanyId,
        items: &[AuditorScoreItem],
    ) -> Result<AuditorScoresSubmitted, AssessmentError> {
        if items.is_empty() {
            return Err(AssessmentError::EmptyBatch {
                operation: "auditor score submission",
            });
        }

        let outcome = self
            .store
            .transaction(|ledger| submit_scores_in(ledger, auditor, company, items));

        match &outcome {
            Ok(summary) => info!(
                %auditor,
                %company,
                created = summary.created,
                updated = summary.updated,
                "submitted auditor scores"
            ),
            Err(error) => warn!(%auditor, %company, %error, "auditor score submission rejected"),
        }
        outcome
    }

    pub fn auditor_scores(
        &self,
        auditor: AuditorId,
        company: CompanyId,
    ) -> Result<Vec<AuditorScoreView>, AssessmentError> {
        self.store
            .transaction(|ledger| -> Result<Vec<AuditorScoreView>, AssessmentError> {
                require_auditor(ledger, auditor)?;
                require_company(ledger, company)?;

                let scores = ledger.auditor_scores(auditor, company)?;
                let choice_ids: Vec<ChoiceId> = scores.iter().map(|score| score.choice_id).collect();
                let choices = ledger.choices(&choice_ids)?;
                let points = choice_points(ledger, &choices)?;

                Ok(scores
                    .into_iter()
                    .map(|score| AuditorScoreView {
                        question_id: score.question_id,
                        company_question_id: score.answer_id,
                        choice_id: score.choice_id,
                        score: points.get(&score.choice_id).copied(),
                        updated_at: score.updated_at,
                    })
                    .collect())
            })
    }

    /// Latest whole-assessment submission per company, ordered by company id.
    pub fn list_submissions(&self) -> Result<Vec<SubmissionSummary>, AssessmentError> {
        self.store
            .transaction(|ledger| -> Result<Vec<SubmissionSummary>, AssessmentError> {
                let mut latest: BTreeMap<CompanyId, DateTime<Utc>> = BTreeMap::new();
                for marker in ledger.assessment_submissions()? {
                    latest.entry(marker.company_id).or_insert(marker.submitted_at);
                }

                let mut summaries = Vec::with_capacity(latest.len());
                for (company_id, submitted_at) in latest {
                    let Some(company) = ledger.company(company_id)? else {
                        continue;
                    };
                    summaries.push(SubmissionSummary {
                        company_id,
                        company_name: company.name,
                        submitted_at,
                        status: AnswerStatus::Submitted,
                        score: cached_total(ledger, company_id)?,
                    });
                }
                Ok(summaries)
            })
    }

    /// Review sheet of one company: its answers, evidence, and the viewing auditor's picks.
    pub fn submission_detail(
        &self,
        viewer: Option<AuditorId>,
        company: CompanyId,
    ) -> Result<SubmissionDetail, AssessmentError> {
        self.store
            .transaction(|ledger| detail_in(ledger, self.evidence.as_ref(), viewer, company))
    }
}

fn cached_total(ledger: &dyn Ledger, company: CompanyId) -> Result<f64, AssessmentError> {
    let total: f64 = ledger
        .pillar_results(company)?
        .iter()
        .map(|result| result.score)
        .sum();
    Ok(round2(total))
}

fn submit_scores_in(
    ledger: &mut dyn Ledger,
    auditor: AuditorId,
    company: CompanyId,
    items: &[AuditorScoreItem],
) -> Result<AuditorScoresSubmitted, AssessmentError> {
    require_auditor(ledger, auditor)?;
    require_company(ledger, company)?;

    if ledger.latest_auditor_submission(auditor, company)?.is_some() {
        return Err(AssessmentError::AlreadySubmitted(
            SubmissionScope::AuditorReview {
                auditor_id: auditor,
                company_id: company,
            },
        ));
    }

    let question_ids: Vec<QuestionId> = items
        .iter()
        .map(|item| item.question_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let answers: HashMap<QuestionId, CompanyAnswer> = ledger
        .answers(company, &question_ids)?
        .into_iter()
        .map(|answer| (answer.question_id, answer))
        .collect();
    let missing: Vec<QuestionId> = question_ids
        .iter()
        .copied()
        .filter(|id| !answers.contains_key(id))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::QuestionsNotInPlay {
            question_ids: missing,
        }
        .into());
    }

    let choice_ids: Vec<ChoiceId> = items
        .iter()
        .map(|item| item.choice_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let owners: HashMap<ChoiceId, QuestionId> = ledger
        .choices(&choice_ids)?
        .into_iter()
        .map(|choice| (choice.id, choice.question_id))
        .collect();
    let unknown: Vec<ChoiceId> = choice_ids
        .iter()
        .copied()
        .filter(|id| !owners.contains_key(id))
        .collect();
    if !unknown.is_empty() {
        return Err(ValidationError::UnknownChoices {
            choice_ids: unknown,
        }
        .into());
    }

    let mismatched: BTreeSet<ChoicePair> = items
        .iter()
        .filter(|item| owners.get(&item.choice_id) != Some(&item.question_id))
        .map(|item| ChoicePair {
            question_id: item.question_id,
            choice_id: item.choice_id,
        })
        .collect();
    if !mismatched.is_empty() {
        return Err(ValidationError::ChoiceMismatch {
            pairs: mismatched.into_iter().collect(),
        }
        .into());
    }

    let mut summary = AuditorScoresSubmitted {
        processed: 0,
        created: 0,
        updated: 0,
    };
    for item in items {
        let Some(answer) = answers.get(&item.question_id) else {
            continue;
        };
        match ledger.upsert_auditor_score(auditor, answer, item.choice_id)? {
            Upserted::Created(_) => summary.created += 1,
            Upserted::Updated(_) => summary.updated += 1,
        }
        summary.processed += 1;
    }

    ledger.insert_auditor_submission(auditor, company)?;
    Ok(summary)
}

fn detail_in<V: EvidenceIndex>(
    ledger: &mut dyn Ledger,
    evidence: &V,
    viewer: Option<AuditorId>,
    company: CompanyId,
) -> Result<SubmissionDetail, AssessmentError> {
    let record = require_company(ledger, company)?;
    let review = match viewer {
        Some(auditor) => {
            require_auditor(ledger, auditor)?;
            let marker = ledger.latest_auditor_submission(auditor, company)?;
            let picks: HashMap<QuestionId, ChoiceId> = ledger
                .auditor_scores(auditor, company)?
                .into_iter()
                .map(|score| (score.question_id, score.choice_id))
                .collect();
            Some((marker, picks))
        }
        None => None,
    };

    let submitted_at = ledger
        .latest_company_submission(company, SubmissionTarget::Assessment)?
        .map(|marker| marker.submitted_at);
    let answers: HashMap<QuestionId, CompanyAnswer> = ledger
        .company_answers(company)?
        .into_iter()
        .map(|answer| (answer.question_id, answer))
        .collect();

    let mut pillars = Vec::new();
    for pillar in ledger.pillars()? {
        let questions = ledger.questions_in_pillar(pillar.id)?;
        if questions.is_empty() {
            continue;
        }

        let question_ids: Vec<QuestionId> = questions.iter().map(|question| question.id).collect();
        let choices = ledger.choices_for_questions(&question_ids)?;
        let points = choice_points(ledger, &choices)?;

        let mut rows = Vec::with_capacity(questions.len());
        for question in questions {
            let answer = answers.get(&question.id);
            let selected = answer.and_then(|answer| answer.choice_id);
            let options: Vec<DetailOption> = choices
                .iter()
                .filter(|choice| choice.question_id == question.id)
                .map(|choice| DetailOption {
                    choice_id: choice.id,
                    label: choice.label.clone(),
                    score: points.get(&choice.id).copied(),
                    selected: Some(choice.id) == selected,
                })
                .collect();
            let selected_option = options.iter().find(|option| option.selected);

            let links: Vec<String> = match answer {
                Some(answer) => evidence
                    .evidence(answer.id)?
                    .iter()
                    .filter_map(|record| record.public_url())
                    .collect(),
                None => Vec::new(),
            };
            let auditor_choice_id = review
                .as_ref()
                .and_then(|(_, picks)| picks.get(&question.id).copied());

            rows.push(DetailQuestion {
                question_id: question.id,
                answer_id: answer.map(|answer| answer.id),
                status: answer.map(|answer| answer.status),
                performance_notes: answer.and_then(|answer| answer.performance_notes.clone()),
                selected_choice_id: selected,
                selected_label: selected_option.map(|option| option.label.clone()),
                selected_score: selected_option.and_then(|option| option.score),
                auditor_choice_id,
                auditor_score: auditor_choice_id.and_then(|choice| points.get(&choice).copied()),
                title: question.title,
                detail: question.description,
                options,
                evidence: links,
            });
        }

        pillars.push(DetailPillar {
            pillar_id: pillar.id,
            key: pillar.key,
            name: pillar.name,
            weight: pillar.weight,
            questions: rows,
        });
    }

    let auditor_submitted_at = review
        .as_ref()
        .and_then(|(marker, _)| marker.map(|marker| marker.submitted_at));

    Ok(SubmissionDetail {
        company_id: record.id,
        company_name: record.name,
        submitted_at,
        overall_score: cached_total(ledger, company)?,
        auditor_submitted: auditor_submitted_at.is_some(),
        auditor_submitted_at,
        pillars,
    })
}
