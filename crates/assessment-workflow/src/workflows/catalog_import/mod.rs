//! CSV seeding for the assessment catalog.
//!
//! Re-importing the same file is a no-op apart from refreshed pillar names and weights:
//! pillars match by key, questions by title within their pillar, choices by label within
//! their question, and the canonical points are shared across every choice.

mod parser;

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::workflows::assessment::domain::{PillarId, PointId, QuestionId};
use crate::workflows::assessment::store::{AssessmentStore, Ledger, StoreError};
use crate::workflows::assessment::PointScore;

use parser::CatalogRecord;

#[derive(Debug, thiserror::Error)]
pub enum CatalogImportError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: `{column}` is required")]
    MissingColumn { line: u64, column: &'static str },
    #[error("line {line}: pillar weight `{value}` is not a non-negative number")]
    InvalidWeight { line: u64, value: String },
    #[error("line {line}: point `{value}` is not one of 0, 0.25, 0.5, 0.75, 1")]
    NonCanonicalPoint { line: u64, value: String },
    #[error("line {line}: pillar `{pillar_key}` repeats with a different name or weight")]
    InconsistentPillar { line: u64, pillar_key: String },
    #[error("could not write catalog to the store: {0}")]
    Store(#[from] StoreError),
}

/// Counts of catalog rows touched by one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub rows: usize,
    pub pillars_created: usize,
    pub pillars_updated: usize,
    pub questions_created: usize,
    pub choices_created: usize,
    pub points_created: usize,
}

pub struct CatalogImporter;

impl CatalogImporter {
    pub fn from_path<S, P>(store: &S, path: P) -> Result<ImportSummary, CatalogImportError>
    where
        S: AssessmentStore,
        P: AsRef<Path>,
    {
        let file = std::fs::File::open(path)?;
        Self::from_reader(store, file)
    }

    /// Parses the whole file before writing, then applies it in one transaction.
    pub fn from_reader<S, R>(store: &S, reader: R) -> Result<ImportSummary, CatalogImportError>
    where
        S: AssessmentStore,
        R: Read,
    {
        let records = parser::parse_records(reader)?;
        let summary = store.transaction(|ledger| apply(ledger, &records))?;
        info!(
            rows = summary.rows,
            pillars_created = summary.pillars_created,
            questions_created = summary.questions_created,
            choices_created = summary.choices_created,
            "catalog imported"
        );
        Ok(summary)
    }
}

fn apply(
    ledger: &mut dyn Ledger,
    records: &[CatalogRecord],
) -> Result<ImportSummary, CatalogImportError> {
    let mut summary = ImportSummary {
        rows: records.len(),
        ..ImportSummary::default()
    };
    let mut points = canonical_points(ledger)?;
    let mut pillars: HashMap<&str, (PillarId, &CatalogRecord)> = HashMap::new();
    let mut questions: HashMap<(PillarId, String), QuestionId> = HashMap::new();

    for record in records {
        let pillar = match pillars.get(record.pillar_key.as_str()) {
            Some((id, first)) => {
                if first.pillar_name != record.pillar_name
                    || first.pillar_weight != record.pillar_weight
                {
                    return Err(CatalogImportError::InconsistentPillar {
                        line: record.line,
                        pillar_key: record.pillar_key.clone(),
                    });
                }
                *id
            }
            None => {
                let upserted = ledger.upsert_pillar(
                    &record.pillar_key,
                    &record.pillar_name,
                    record.pillar_weight,
                )?;
                if upserted.is_created() {
                    summary.pillars_created += 1;
                } else {
                    summary.pillars_updated += 1;
                }
                pillars.insert(record.pillar_key.as_str(), (upserted.id(), record));
                upserted.id()
            }
        };

        let Some(title) = record.question.as_deref() else {
            continue;
        };
        let question = match questions.get(&(pillar, title.to_string())) {
            Some(id) => *id,
            None => {
                let existing = ledger
                    .questions_in_pillar(pillar)?
                    .into_iter()
                    .find(|question| question.title == title)
                    .map(|question| question.id);
                let id = match existing {
                    Some(id) => id,
                    None => {
                        summary.questions_created += 1;
                        debug!(
                            line = record.line,
                            pillar = %record.pillar_key,
                            title,
                            "question created"
                        );
                        ledger.insert_question(pillar, title, record.question_detail.as_deref())?
                    }
                };
                questions.insert((pillar, title.to_string()), id);
                id
            }
        };

        let Some(label) = record.choice.as_deref() else {
            continue;
        };
        let known = ledger
            .choices_for_questions(&[question])?
            .into_iter()
            .any(|choice| choice.label == label);
        if known {
            continue;
        }

        let point = match record.point {
            Some(score) => Some(match points.get(&score) {
                Some(id) => *id,
                None => {
                    let id = ledger.insert_point(score.raw())?;
                    summary.points_created += 1;
                    points.insert(score, id);
                    id
                }
            }),
            None => None,
        };
        ledger.insert_choice(question, label, point)?;
        summary.choices_created += 1;
    }

    Ok(summary)
}

/// Existing point rows keyed by the canonical value they hold; off-table rows are ignored.
fn canonical_points(ledger: &dyn Ledger) -> Result<HashMap<PointScore, PointId>, StoreError> {
    let mut points = HashMap::new();
    for point in ledger.all_points()? {
        if let Some(score) = PointScore::from_raw(point.score) {
            points.entry(score).or_insert(point.id);
        }
    }
    Ok(points)
}
