use serde::{Deserialize, Serialize};

/// Normalized sub-score awarded for a fully met question.
pub const MAX_SUB_SCORE: f64 = 20.0;

pub(crate) const MAX_STARS: i64 = 5;

/// The five canonical point values a choice may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointScore {
    Zero,
    Quarter,
    Half,
    ThreeQuarters,
    Full,
}

impl PointScore {
    pub const ALL: [PointScore; 5] = [
        PointScore::Zero,
        PointScore::Quarter,
        PointScore::Half,
        PointScore::ThreeQuarters,
        PointScore::Full,
    ];

    /// Resolves a stored point value after rounding to hundredths. Values off the table,
    /// including NaN and infinities, resolve to `None`.
    pub fn from_raw(raw: f64) -> Option<Self> {
        if !raw.is_finite() {
            return None;
        }

        match (raw * 100.0).round() as i64 {
            0 => Some(PointScore::Zero),
            25 => Some(PointScore::Quarter),
            50 => Some(PointScore::Half),
            75 => Some(PointScore::ThreeQuarters),
            100 => Some(PointScore::Full),
            _ => None,
        }
    }

    pub const fn raw(self) -> f64 {
        match self {
            PointScore::Zero => 0.0,
            PointScore::Quarter => 0.25,
            PointScore::Half => 0.5,
            PointScore::ThreeQuarters => 0.75,
            PointScore::Full => 1.0,
        }
    }

    pub const fn normalized(self) -> f64 {
        match self {
            PointScore::Zero => 0.0,
            PointScore::Quarter => 5.0,
            PointScore::Half => 10.0,
            PointScore::ThreeQuarters => 15.0,
            PointScore::Full => MAX_SUB_SCORE,
        }
    }
}

/// Maps a raw point value onto the 0-20 sub-score scale; off-table values score zero.
pub fn normalized_sub_score(raw: f64) -> f64 {
    match PointScore::from_raw(raw) {
        Some(score) => score.normalized(),
        None => 0.0,
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Star rating for an achieved score against its maximum. Halves round away from zero.
pub fn star_count(overall: f64, max: f64) -> u8 {
    if max <= 0.0 || !overall.is_finite() || !max.is_finite() {
        return 0;
    }

    let stars = ((overall / max) * MAX_STARS as f64).round() as i64;
    stars.clamp(0, MAX_STARS) as u8
}
