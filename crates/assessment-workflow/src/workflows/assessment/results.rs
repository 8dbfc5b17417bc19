use std::collections::HashMap;

use tracing::{debug, info};

use super::domain::{AuditorId, ChoiceId, CompanyId, Pillar, QuestionId};
use super::evidence::EvidenceIndex;
use super::scoring::{OverallResult, PillarScore, ScoringEngine};
use super::service::{
    choice_points, require_auditor, require_company, require_pillar, AssessmentError,
    AssessmentService,
};
use super::store::{AssessmentStore, Ledger, StoreError};

impl<S, V> AssessmentService<S, V>
where
    S: AssessmentStore + 'static,
    V: EvidenceIndex + 'static,
{
    /// Weighted score of one pillar from the company's current selections. Refreshes the
    /// cached pillar result in the same transaction.
    pub fn compute_pillar_score(
        &self,
        company: CompanyId,
        pillar_key: &str,
    ) -> Result<PillarScore, AssessmentError> {
        let engine = self.engine;
        self.store
            .transaction(|ledger| -> Result<PillarScore, AssessmentError> {
                require_company(ledger, company)?;
                let pillar = require_pillar(ledger, pillar_key)?;
                let score = score_company_pillar(ledger, &engine, company, &pillar)?;
                ledger.upsert_pillar_result(company, pillar.id, score.weighted())?;
                debug!(%company, pillar = pillar_key, score = score.score, "scored pillar");
                Ok(score)
            })
    }

    /// Overall result across every active pillar, in pillar id order.
    pub fn compute_overall(&self, company: CompanyId) -> Result<OverallResult, AssessmentError> {
        let engine = self.engine;
        let result = self
            .store
            .transaction(|ledger| -> Result<OverallResult, AssessmentError> {
                require_company(ledger, company)?;

                let mut scores = Vec::new();
                for pillar in ledger.pillars()? {
                    let score = score_company_pillar(ledger, &engine, company, &pillar)?;
                    ledger.upsert_pillar_result(company, pillar.id, score.weighted())?;
                    scores.push(score);
                }
                Ok(engine.overall(scores))
            })?;

        info!(
            %company,
            overall = result.overall_score,
            stars = result.star_count,
            "computed overall result"
        );
        Ok(result)
    }

    /// Overall result from the auditor's selections instead of the company's. Nothing is
    /// cached.
    pub fn auditor_results(
        &self,
        auditor: AuditorId,
        company: CompanyId,
    ) -> Result<OverallResult, AssessmentError> {
        let engine = self.engine;
        self.store
            .transaction(|ledger| -> Result<OverallResult, AssessmentError> {
                require_auditor(ledger, auditor)?;
                require_company(ledger, company)?;

                let picks: HashMap<QuestionId, ChoiceId> = ledger
                    .auditor_scores(auditor, company)?
                    .into_iter()
                    .map(|score| (score.question_id, score.choice_id))
                    .collect();

                let mut scores = Vec::new();
                for pillar in ledger.pillars()? {
                    scores.push(score_pillar_with(ledger, &engine, &pillar, &picks)?);
                }
                Ok(engine.overall(scores))
            })
    }
}

fn score_company_pillar(
    ledger: &dyn Ledger,
    engine: &ScoringEngine,
    company: CompanyId,
    pillar: &Pillar,
) -> Result<PillarScore, StoreError> {
    let picks: HashMap<QuestionId, ChoiceId> = ledger
        .company_answers(company)?
        .into_iter()
        .filter_map(|answer| Some((answer.question_id, answer.choice_id?)))
        .collect();
    score_pillar_with(ledger, engine, pillar, &picks)
}

/// Scores `pillar` from a question -> choice selection map. Selections for questions
/// outside the pillar are ignored.
fn score_pillar_with(
    ledger: &dyn Ledger,
    engine: &ScoringEngine,
    pillar: &Pillar,
    picks: &HashMap<QuestionId, ChoiceId>,
) -> Result<PillarScore, StoreError> {
    let questions = ledger.questions_in_pillar(pillar.id)?;
    let chosen: Vec<ChoiceId> = questions
        .iter()
        .filter_map(|question| picks.get(&question.id).copied())
        .collect();
    let choices = ledger.choices(&chosen)?;
    let points = choice_points(ledger, &choices)?;

    let selections = chosen.iter().map(|choice| points.get(choice).copied());
    Ok(engine.score_pillar(pillar, questions.len(), selections))
}
