mod table;

pub use table::{normalized_sub_score, round2, star_count, PointScore, MAX_SUB_SCORE};

use serde::{Deserialize, Serialize};

use super::domain::{Pillar, PillarId};

/// Stateless evaluator turning point selections into weighted pillar scores and stars.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Scores one pillar. `selections` yields the raw point of each answered question's
    /// chosen choice (`None` when there is no choice or the choice carries no point).
    pub fn score_pillar<I>(&self, pillar: &Pillar, question_count: usize, selections: I) -> PillarScore
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let weight = pillar.effective_weight();

        if question_count == 0 {
            return PillarScore {
                pillar_id: pillar.id,
                key: pillar.key.clone(),
                name: pillar.name.clone(),
                weight: pillar.weight,
                score: 0.0,
                max_score: round2(weight.unwrap_or_default()),
                weighted: 0.0,
            };
        }

        let raw: f64 = selections
            .into_iter()
            .map(|point| point.map(normalized_sub_score).unwrap_or_default())
            .sum();
        let max_raw = question_count as f64 * MAX_SUB_SCORE;

        let (weighted, max) = match weight {
            Some(weight) if max_raw > 0.0 => (raw / max_raw * weight, weight),
            _ => (raw, max_raw),
        };

        PillarScore {
            pillar_id: pillar.id,
            key: pillar.key.clone(),
            name: pillar.name.clone(),
            weight: pillar.weight,
            score: round2(weighted),
            max_score: round2(max),
            weighted,
        }
    }

    pub fn overall(&self, pillars: Vec<PillarScore>) -> OverallResult {
        let overall_score = round2(pillars.iter().map(|pillar| pillar.score).sum());
        let max_score = round2(pillars.iter().map(|pillar| pillar.max_score).sum());

        OverallResult {
            overall_score,
            max_score,
            star_count: star_count(overall_score, max_score),
            pillars,
        }
    }
}

/// Weighted score for a single pillar, rounded for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillarScore {
    pub pillar_id: PillarId,
    pub key: String,
    pub name: String,
    pub weight: Option<f64>,
    pub score: f64,
    pub max_score: f64,
    /// Unrounded weighted score written to the result cache.
    #[serde(skip)]
    pub(crate) weighted: f64,
}

impl PillarScore {
    pub fn weighted(&self) -> f64 {
        self.weighted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallResult {
    pub overall_score: f64,
    pub max_score: f64,
    pub star_count: u8,
    pub pillars: Vec<PillarScore>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pillar(id: i64, weight: Option<f64>) -> Pillar {
        Pillar {
            id: PillarId(id),
            key: format!("pillar-{id}"),
            name: format!("Pillar {id}"),
            weight,
        }
    }

    #[test]
    fn full_marks_reach_the_pillar_weight() {
        let engine = ScoringEngine::new();
        let score = engine.score_pillar(&pillar(1, Some(300.0)), 4, vec![Some(1.0); 4]);
        assert_eq!(score.score, 300.0);
        assert_eq!(score.max_score, 300.0);
    }

    #[test]
    fn unanswered_and_pointless_choices_score_zero() {
        let engine = ScoringEngine::new();
        let score = engine.score_pillar(
            &pillar(1, Some(200.0)),
            4,
            vec![Some(0.5), None, Some(0.33)],
        );
        // 10 of 80 raw points.
        assert_eq!(score.score, 25.0);
        assert_eq!(score.max_score, 200.0);
    }

    #[test]
    fn unweighted_pillars_report_raw_totals() {
        let engine = ScoringEngine::new();
        for weight in [None, Some(0.0)] {
            let score = engine.score_pillar(&pillar(2, weight), 3, vec![Some(0.75), Some(0.25)]);
            assert_eq!(score.score, 20.0);
            assert_eq!(score.max_score, 60.0);
        }
    }

    #[test]
    fn empty_pillars_contribute_only_their_weight_to_the_maximum() {
        let engine = ScoringEngine::new();
        let score = engine.score_pillar(&pillar(3, Some(200.0)), 0, Vec::new());
        assert_eq!(score.score, 0.0);
        assert_eq!(score.max_score, 200.0);
    }

    #[test]
    fn weighted_scores_keep_precision_for_the_cache() {
        let engine = ScoringEngine::new();
        let score = engine.score_pillar(&pillar(1, Some(100.0)), 3, vec![Some(1.0)]);
        assert_eq!(score.score, 33.33);
        assert!((score.weighted() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn overall_sums_pillars_and_derives_stars() {
        let engine = ScoringEngine::new();
        let pillars = vec![
            engine.score_pillar(&pillar(1, Some(300.0)), 4, vec![Some(1.0); 4]),
            engine.score_pillar(&pillar(2, Some(300.0)), 2, Vec::new()),
            engine.score_pillar(&pillar(3, Some(200.0)), 0, Vec::new()),
            engine.score_pillar(&pillar(4, Some(200.0)), 1, vec![Some(0.0)]),
        ];

        let overall = engine.overall(pillars);
        assert_eq!(overall.overall_score, 300.0);
        assert_eq!(overall.max_score, 1000.0);
        assert_eq!(overall.star_count, 2);
        assert_eq!(overall.pillars.len(), 4);
    }

    #[test]
    fn overall_without_pillars_has_no_stars() {
        let overall = ScoringEngine::new().overall(Vec::new());
        assert_eq!(overall.max_score, 0.0);
        assert_eq!(overall.star_count, 0);
    }
}
