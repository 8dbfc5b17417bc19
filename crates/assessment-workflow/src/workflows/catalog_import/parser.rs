use serde::{Deserialize, Deserializer};
use std::io::Read;

use super::CatalogImportError;
use crate::workflows::assessment::PointScore;

/// One validated catalog line. Later columns are optional so a line may declare only a
/// pillar, a pillar and question, or a full pillar/question/choice triple.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CatalogRecord {
    pub(crate) line: u64,
    pub(crate) pillar_key: String,
    pub(crate) pillar_name: String,
    pub(crate) pillar_weight: Option<f64>,
    pub(crate) question: Option<String>,
    pub(crate) question_detail: Option<String>,
    pub(crate) choice: Option<String>,
    pub(crate) point: Option<PointScore>,
}

pub(crate) fn parse_records<R: Read>(reader: R) -> Result<Vec<CatalogRecord>, CatalogImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let mut records = Vec::new();

    for raw in csv_reader.records() {
        let raw = raw?;
        let line = raw.position().map(|position| position.line()).unwrap_or_default();
        let row: CatalogRow = raw.deserialize(Some(&headers))?;
        records.push(row.validate(line)?);
    }

    Ok(records)
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    pillar_key: String,
    pillar_name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pillar_weight: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    question: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    question_detail: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    choice: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    point: Option<String>,
}

impl CatalogRow {
    fn validate(self, line: u64) -> Result<CatalogRecord, CatalogImportError> {
        if self.pillar_key.is_empty() {
            return Err(CatalogImportError::MissingColumn {
                line,
                column: "pillar_key",
            });
        }
        if self.choice.is_some() && self.question.is_none() {
            return Err(CatalogImportError::MissingColumn {
                line,
                column: "question",
            });
        }

        let pillar_weight = match self.pillar_weight {
            Some(value) => Some(
                parse_weight(&value)
                    .ok_or_else(|| CatalogImportError::InvalidWeight { line, value })?,
            ),
            None => None,
        };

        let point = match self.point {
            Some(value) => Some(
                parse_point(&value)
                    .ok_or_else(|| CatalogImportError::NonCanonicalPoint { line, value })?,
            ),
            None => None,
        };

        Ok(CatalogRecord {
            line,
            pillar_name: if self.pillar_name.is_empty() {
                self.pillar_key.clone()
            } else {
                self.pillar_name
            },
            pillar_key: self.pillar_key,
            pillar_weight,
            question: self.question,
            question_detail: self.question_detail,
            choice: self.choice,
            point,
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_weight(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|weight| weight.is_finite() && *weight >= 0.0)
}

/// Accepts only the canonical point values, compared exactly rather than after rounding.
fn parse_point(value: &str) -> Option<PointScore> {
    let raw = value.parse::<f64>().ok()?;
    PointScore::ALL
        .into_iter()
        .find(|score| score.raw() == raw)
}
