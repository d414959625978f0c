//! Scoring curves mapping a raw factor value onto [0, 100].
//!
//! Two shapes are supported:
//!
//! - **Steps**: banded thresholds, the classic scorecard table
//!   (`ROE >= 20% -> 100, >= 15% -> 80, ...`).
//! - **Linear**: piecewise-linear interpolation between knots, flat beyond
//!   the first and last knot.
//!
//! Lower-is-better metrics use a [`Polarity::LowerIsBetter`] step curve or a
//! linear curve whose knot scores decrease.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Result, ScoringError};

/// Upper bound of every score.
pub const MAX_SCORE: f64 = 100.0;

/// Direction in which a raw metric improves.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Larger values are better (ROE, margins, yields)
    #[default]
    HigherIsBetter,
    /// Smaller values are better (valuation multiples, leverage)
    LowerIsBetter,
}

/// One band of a step curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    /// Threshold; inclusive
    pub bound: f64,
    /// Score awarded when the threshold is met
    pub score: f64,
}

/// One knot of a linear curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Knot {
    /// Raw value
    pub x: f64,
    /// Score at `x`
    pub y: f64,
}

/// A scoring curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreCurve {
    /// Banded thresholds.
    ///
    /// For [`Polarity::HigherIsBetter`] the first band (from the highest
    /// bound down) with `value >= bound` wins; for
    /// [`Polarity::LowerIsBetter`] the first band (from the lowest bound up)
    /// with `value <= bound` wins. Values meeting no band get `floor`.
    Steps {
        /// Improvement direction
        polarity: Polarity,
        /// Bands, in any order
        bands: Vec<Band>,
        /// Score when no band matches
        floor: f64,
        /// Score for zero or negative values, overriding the bands
        #[serde(default, skip_serializing_if = "Option::is_none")]
        non_positive: Option<f64>,
    },
    /// Piecewise-linear interpolation between knots sorted by `x`.
    Linear {
        /// Knots, strictly increasing in `x`
        knots: Vec<Knot>,
    },
}

impl ScoreCurve {
    /// Step curve where larger values are better.
    pub fn steps_higher(bands: &[(f64, f64)], floor: f64) -> Self {
        Self::Steps {
            polarity: Polarity::HigherIsBetter,
            bands: bands.iter().map(|&(bound, score)| Band { bound, score }).collect(),
            floor,
            non_positive: None,
        }
    }

    /// Step curve where smaller values are better.
    pub fn steps_lower(bands: &[(f64, f64)], floor: f64) -> Self {
        Self::Steps {
            polarity: Polarity::LowerIsBetter,
            bands: bands.iter().map(|&(bound, score)| Band { bound, score }).collect(),
            floor,
            non_positive: None,
        }
    }

    /// Piecewise-linear curve through `(x, y)` knots.
    pub fn linear(knots: &[(f64, f64)]) -> Self {
        Self::Linear {
            knots: knots.iter().map(|&(x, y)| Knot { x, y }).collect(),
        }
    }

    /// Override the score of zero and negative inputs (e.g. loss-making P/E).
    pub fn with_non_positive(self, score: f64) -> Self {
        match self {
            Self::Steps {
                polarity,
                bands,
                floor,
                ..
            } => Self::Steps {
                polarity,
                bands,
                floor,
                non_positive: Some(score),
            },
            linear @ Self::Linear { .. } => linear,
        }
    }

    /// Score a raw value. Non-finite inputs have no score.
    pub fn evaluate(&self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            return None;
        }
        let score = match self {
            Self::Steps {
                polarity,
                bands,
                floor,
                non_positive,
            } => match non_positive {
                Some(score) if value <= 0.0 => *score,
                _ => step_score(*polarity, bands, *floor, value),
            },
            Self::Linear { knots } => interpolate(knots, value)?,
        };
        Some(score.clamp(0.0, MAX_SCORE))
    }

    /// Check the curve's shape.
    pub fn validate(&self, scope: &str) -> Result<()> {
        let in_range = |s: f64| s.is_finite() && (0.0..=MAX_SCORE).contains(&s);
        match self {
            Self::Steps {
                bands,
                floor,
                non_positive,
                ..
            } => {
                if bands.is_empty() {
                    return Err(ScoringError::config(scope, "step curve needs at least one band"));
                }
                if bands.iter().any(|b| !b.bound.is_finite() || !in_range(b.score))
                    || !in_range(*floor)
                    || non_positive.is_some_and(|s| !in_range(s))
                {
                    return Err(ScoringError::config(
                        scope,
                        "step bounds must be finite and scores within [0, 100]",
                    ));
                }
                let mut bounds: Vec<f64> = bands.iter().map(|b| b.bound).collect();
                bounds.sort_by(f64::total_cmp);
                if bounds.windows(2).any(|w| w[0] == w[1]) {
                    return Err(ScoringError::config(scope, "duplicate step bound"));
                }
            }
            Self::Linear { knots } => {
                if knots.len() < 2 {
                    return Err(ScoringError::config(scope, "linear curve needs at least two knots"));
                }
                if knots.iter().any(|k| !k.x.is_finite() || !in_range(k.y)) {
                    return Err(ScoringError::config(
                        scope,
                        "knots must be finite with scores within [0, 100]",
                    ));
                }
                if knots.windows(2).any(|w| w[0].x >= w[1].x) {
                    return Err(ScoringError::config(scope, "knots must be strictly increasing in x"));
                }
            }
        }
        Ok(())
    }
}

fn step_score(polarity: Polarity, bands: &[Band], floor: f64, value: f64) -> f64 {
    let mut ordered: Vec<&Band> = bands.iter().collect();
    match polarity {
        Polarity::HigherIsBetter => {
            ordered.sort_by(|a, b| b.bound.total_cmp(&a.bound));
            ordered
                .into_iter()
                .find(|b| value >= b.bound)
                .map_or(floor, |b| b.score)
        }
        Polarity::LowerIsBetter => {
            ordered.sort_by(|a, b| a.bound.total_cmp(&b.bound));
            ordered
                .into_iter()
                .find(|b| value <= b.bound)
                .map_or(floor, |b| b.score)
        }
    }
}

fn interpolate(knots: &[Knot], value: f64) -> Option<f64> {
    let first = knots.first()?;
    let last = knots.last()?;
    if value <= first.x {
        return Some(first.y);
    }
    if value >= last.x {
        return Some(last.y);
    }
    knots.windows(2).find_map(|w| {
        let (lo, hi) = (w[0], w[1]);
        (value >= lo.x && value <= hi.x).then(|| lo.y + (value - lo.x) * (hi.y - lo.y) / (hi.x - lo.x))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn roe_curve() -> ScoreCurve {
        ScoreCurve::steps_higher(&[(20.0, 100.0), (15.0, 80.0), (10.0, 60.0), (5.0, 40.0)], 20.0)
    }

    #[rstest]
    #[case(25.0, 100.0)]
    #[case(20.0, 100.0)]
    #[case(18.0, 80.0)]
    #[case(15.0, 80.0)]
    #[case(9.99, 40.0)]
    #[case(5.0, 40.0)]
    #[case(-3.0, 20.0)]
    fn test_steps_higher_is_better(#[case] value: f64, #[case] expected: f64) {
        assert_eq!(roe_curve().evaluate(value), Some(expected));
    }

    #[rstest]
    #[case(30.0, 100.0)]
    #[case(40.0, 100.0)]
    #[case(40.01, 70.0)]
    #[case(60.0, 70.0)]
    #[case(75.0, 40.0)]
    fn test_steps_lower_is_better(#[case] value: f64, #[case] expected: f64) {
        let curve = ScoreCurve::steps_lower(&[(40.0, 100.0), (60.0, 70.0)], 40.0);
        assert_eq!(curve.evaluate(value), Some(expected));
    }

    #[test]
    fn test_non_positive_override() {
        let pe = ScoreCurve::steps_lower(&[(10.0, 100.0), (20.0, 70.0)], 20.0).with_non_positive(0.0);
        assert_eq!(pe.evaluate(-5.0), Some(0.0));
        assert_eq!(pe.evaluate(0.0), Some(0.0));
        assert_eq!(pe.evaluate(8.0), Some(100.0));
    }

    #[test]
    fn test_linear_interpolation_and_clamping() {
        let curve = ScoreCurve::linear(&[(0.0, 0.0), (10.0, 50.0), (20.0, 100.0)]);
        assert_eq!(curve.evaluate(-1.0), Some(0.0));
        assert_relative_eq!(curve.evaluate(5.0).unwrap(), 25.0, epsilon = 1e-12);
        assert_relative_eq!(curve.evaluate(15.0).unwrap(), 75.0, epsilon = 1e-12);
        assert_eq!(curve.evaluate(50.0), Some(100.0));
    }

    #[test]
    fn test_decreasing_linear_curve() {
        let curve = ScoreCurve::linear(&[(0.8, 100.0), (1.0, 60.0), (1.2, 20.0)]);
        assert_relative_eq!(curve.evaluate(0.9).unwrap(), 80.0, epsilon = 1e-9);
        assert_eq!(curve.evaluate(2.0), Some(20.0));
    }

    #[test]
    fn test_non_finite_has_no_score() {
        assert_eq!(roe_curve().evaluate(f64::NAN), None);
        assert_eq!(roe_curve().evaluate(f64::INFINITY), None);
    }

    #[test]
    fn test_validation() {
        roe_curve().validate("test").unwrap();
        assert!(ScoreCurve::linear(&[(1.0, 0.0)]).validate("test").is_err());
        assert!(ScoreCurve::linear(&[(1.0, 0.0), (1.0, 50.0)]).validate("test").is_err());
        assert!(ScoreCurve::steps_higher(&[(1.0, 120.0)], 0.0).validate("test").is_err());
        assert!(ScoreCurve::steps_higher(&[(1.0, 50.0), (1.0, 60.0)], 0.0).validate("test").is_err());
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(ScoreCurve::linear(&[(0.0, 0.0), (1.0, 100.0)])).unwrap();
        assert_eq!(json["kind"], "linear");
        let back: ScoreCurve = serde_json::from_value(json).unwrap();
        assert_eq!(back, ScoreCurve::linear(&[(0.0, 0.0), (1.0, 100.0)]));
    }
}
