//! Composite score and rating.
//!
//! ```text
//! total = Σ w_d · s_d / Σ w_d     over dimensions with a sub-score and w_d > 0
//! ```
//!
//! The industry-neutral total uses the same formula on the neutral inputs
//! (rank percentile or mapped z-score) instead of the raw sub-scores.

use std::collections::BTreeMap;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    Result, ScoringError,
    component::weighted_mean,
    config::{NeutralBasis, NormalizerConfig},
    curve::MAX_SCORE,
    normalize::NormalizedScores,
    registry::{Dimension, DimensionScores, ScoredSecurity},
};

/// Weight per dimension. Dimensions left out of a serialized map weigh 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Dimension, f64>", into = "BTreeMap<Dimension, f64>")]
pub struct DimensionWeights([f64; 8]);

impl Default for DimensionWeights {
    fn default() -> Self {
        Self::zero()
            .with(Dimension::Profitability, 0.20)
            .with(Dimension::Operation, 0.15)
            .with(Dimension::Growth, 0.15)
            .with(Dimension::Solvency, 0.10)
            .with(Dimension::CashFlow, 0.10)
            .with(Dimension::Valuation, 0.20)
            .with(Dimension::Dividend, 0.10)
            .with(Dimension::SizeLiquidity, 0.0)
    }
}

impl From<BTreeMap<Dimension, f64>> for DimensionWeights {
    fn from(map: BTreeMap<Dimension, f64>) -> Self {
        map.into_iter()
            .fold(Self::zero(), |weights, (d, w)| weights.with(d, w))
    }
}

impl From<DimensionWeights> for BTreeMap<Dimension, f64> {
    fn from(weights: DimensionWeights) -> Self {
        weights.iter().collect()
    }
}

impl DimensionWeights {
    /// All weights zero.
    pub const fn zero() -> Self {
        Self([0.0; 8])
    }

    /// Set the weight of a dimension.
    pub const fn with(mut self, dimension: Dimension, weight: f64) -> Self {
        self.0[dimension.index()] = weight;
        self
    }

    /// Weight of a dimension.
    pub const fn get(&self, dimension: Dimension) -> f64 {
        self.0[dimension.index()]
    }

    /// `(dimension, weight)` pairs in the fixed dimension order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        Dimension::ALL.into_iter().map(|d| (d, self.get(d)))
    }

    /// Whether every weight is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|w| *w == 0.0)
    }

    /// Weights must be finite and non-negative with at least one positive.
    pub fn validate(&self, scope: &str) -> Result<()> {
        if let Some((dimension, weight)) = self.iter().find(|(_, w)| !w.is_finite() || *w < 0.0) {
            return Err(ScoringError::config(
                scope,
                format!("weight {weight} for {} must be finite and non-negative", dimension.as_str()),
            ));
        }
        if !self.0.iter().any(|w| *w > 0.0) {
            return Err(ScoringError::config(scope, "at least one weight must be positive"));
        }
        Ok(())
    }

    /// Renormalized weighted mean of the present scores.
    pub fn combine(&self, scores: &DimensionScores) -> Option<f64> {
        weighted_mean(scores.iter().map(|(d, s)| (self.get(d), s)))
    }
}

/// Letter rating, best first.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rating {
    /// Core holding
    A,
    /// Steady
    B,
    /// Average
    C,
    /// Risk
    D,
}

impl Rating {
    /// All ratings, best first.
    pub const ALL: [Self; 4] = [Self::A, Self::B, Self::C, Self::D];

    /// Descriptive label.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::A => "core",
            Self::B => "steady",
            Self::C => "average",
            Self::D => "risk",
        }
    }

    /// Ordinal tier, higher is better.
    pub const fn tier(&self) -> u8 {
        match self {
            Self::A => 4,
            Self::B => 3,
            Self::C => 2,
            Self::D => 1,
        }
    }

    /// Stable name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }

    /// Parse a stable name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == name)
    }
}

/// Lower-closed cut points for the letter ratings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingScale {
    /// Minimum total for A
    pub a_min: f64,
    /// Minimum total for B
    pub b_min: f64,
    /// Minimum total for C
    pub c_min: f64,
}

impl Default for RatingScale {
    fn default() -> Self {
        Self {
            a_min: 85.0,
            b_min: 70.0,
            c_min: 55.0,
        }
    }
}

impl RatingScale {
    /// Rating of a total score.
    pub fn rate(&self, score: f64) -> Rating {
        if score >= self.a_min {
            Rating::A
        } else if score >= self.b_min {
            Rating::B
        } else if score >= self.c_min {
            Rating::C
        } else {
            Rating::D
        }
    }

    /// Cut points must lie within [0, 100] and strictly descend.
    pub fn validate(&self) -> Result<()> {
        let cuts = [self.a_min, self.b_min, self.c_min];
        if cuts.iter().any(|c| !c.is_finite() || !(0.0..=MAX_SCORE).contains(c)) {
            return Err(ScoringError::config("engine.rating", "cut points must lie within [0, 100]"));
        }
        if !(self.a_min > self.b_min && self.b_min > self.c_min) {
            return Err(ScoringError::config(
                "engine.rating",
                "cut points must be strictly descending (a_min > b_min > c_min)",
            ));
        }
        Ok(())
    }
}

/// Composite output for one security and date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    /// Weights applied
    pub weights: DimensionWeights,
    /// Weighted total of the raw sub-scores
    pub total_score: Option<f64>,
    /// Rating of `total_score`
    pub rating: Option<Rating>,
    /// Per-dimension industry-neutral inputs
    pub neutral_inputs: DimensionScores,
    /// Weighted total of the neutral inputs
    pub neutral_total_score: Option<f64>,
    /// Rating of `neutral_total_score`
    pub neutral_rating: Option<Rating>,
    /// Universe-wide position by `total_score`, 1 = best
    pub total_rank: Option<u32>,
}

/// Combines dimension sub-scores into totals and ratings.
#[derive(Debug, Clone)]
pub struct CompositeAggregator {
    weights: DimensionWeights,
    scale: RatingScale,
    basis: NeutralBasis,
    zscore_scale: f64,
}

impl CompositeAggregator {
    /// Create an aggregator.
    pub const fn new(weights: DimensionWeights, scale: RatingScale, normalizer: &NormalizerConfig) -> Self {
        Self {
            weights,
            scale,
            basis: normalizer.neutral_basis,
            zscore_scale: normalizer.zscore_scale,
        }
    }

    /// Default weights.
    pub const fn weights(&self) -> &DimensionWeights {
        &self.weights
    }

    /// Rating cut points.
    pub const fn scale(&self) -> &RatingScale {
        &self.scale
    }

    /// Per-dimension inputs of the industry-neutral total.
    pub fn neutral_inputs(&self, normalized: &NormalizedScores) -> DimensionScores {
        Dimension::ALL
            .into_iter()
            .map(|d| {
                let stats = normalized.dimension(d);
                let input = match self.basis {
                    NeutralBasis::Rank => stats.percentile,
                    NeutralBasis::Zscore => stats
                        .zscore
                        .map(|z| (50.0 + self.zscore_scale * z).clamp(0.0, MAX_SCORE)),
                };
                (d, input)
            })
            .collect()
    }

    /// Composite of one security, without its universe rank.
    pub fn aggregate(&self, scores: &DimensionScores, normalized: &NormalizedScores) -> CompositeScore {
        let total_score = self.weights.combine(scores);
        let neutral_inputs = self.neutral_inputs(normalized);
        let neutral_total_score = self.weights.combine(&neutral_inputs);

        CompositeScore {
            weights: self.weights,
            total_score,
            rating: total_score.map(|s| self.scale.rate(s)),
            neutral_inputs,
            neutral_total_score,
            neutral_rating: neutral_total_score.map(|s| self.scale.rate(s)),
            total_rank: None,
        }
    }

    /// Composites of the whole universe with universe-wide ranks.
    ///
    /// `normalized` must be aligned with `securities`.
    pub fn aggregate_all(
        &self,
        securities: &[ScoredSecurity],
        normalized: &[NormalizedScores],
    ) -> Vec<CompositeScore> {
        let mut composites: Vec<CompositeScore> = securities
            .iter()
            .zip(normalized)
            .map(|(security, peers)| self.aggregate(&security.scores, peers))
            .collect();

        let mut ranked: Vec<usize> = (0..composites.len())
            .filter(|&i| composites[i].total_score.is_some())
            .collect();
        ranked.sort_by(|&a, &b| {
            let (ta, tb) = (
                composites[a].total_score.unwrap_or_default(),
                composites[b].total_score.unwrap_or_default(),
            );
            tb.total_cmp(&ta)
                .then_with(|| securities[a].snapshot.code.cmp(&securities[b].snapshot.code))
        });
        for (position, idx) in ranked.into_iter().enumerate() {
            composites[idx].total_rank = u32::try_from(position + 1).ok();
        }

        info!(
            securities = composites.len(),
            rated = composites.iter().filter(|c| c.rating.is_some()).count(),
            "composites aggregated"
        );
        composites
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dimensions::fixtures, normalize::Normalizer};
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_default_weights_sum_to_one() {
        let weights = DimensionWeights::default();
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        assert_eq!(weights.get(Dimension::SizeLiquidity), 0.0);
        weights.validate("test").unwrap();
    }

    #[test]
    fn test_weights_serde_as_map() {
        let weights: DimensionWeights =
            serde_json::from_str(r#"{"valuation": 2.0, "dividend": 1.0}"#).unwrap();
        assert_eq!(weights.get(Dimension::Valuation), 2.0);
        assert_eq!(weights.get(Dimension::Profitability), 0.0);
        assert!(serde_json::from_str::<DimensionWeights>(r#"{"momentum": 1.0}"#).is_err());
    }

    #[rstest]
    #[case(DimensionWeights::zero())]
    #[case(DimensionWeights::zero().with(Dimension::Growth, -1.0))]
    #[case(DimensionWeights::zero().with(Dimension::Growth, f64::NAN))]
    fn test_invalid_weights(#[case] weights: DimensionWeights) {
        assert!(matches!(
            weights.validate("test"),
            Err(ScoringError::Configuration { .. })
        ));
    }

    #[test]
    fn test_total_renormalizes_over_present_dimensions() {
        let scores: DimensionScores = [
            (Dimension::Profitability, Some(80.0)),
            (Dimension::Valuation, Some(100.0)),
        ]
        .into_iter()
        .collect();
        let total = DimensionWeights::default().combine(&scores).unwrap();
        // (0.2 * 80 + 0.2 * 100) / 0.4
        assert_relative_eq!(total, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_size_liquidity_alone_has_no_total() {
        let scores: DimensionScores = [(Dimension::SizeLiquidity, Some(90.0))].into_iter().collect();
        assert_eq!(DimensionWeights::default().combine(&scores), None);
    }

    #[rstest]
    #[case(100.0, Rating::A)]
    #[case(85.0, Rating::A)]
    #[case(84.999, Rating::B)]
    #[case(70.0, Rating::B)]
    #[case(55.0, Rating::C)]
    #[case(54.9, Rating::D)]
    #[case(0.0, Rating::D)]
    fn test_rating_cut_points(#[case] score: f64, #[case] expected: Rating) {
        assert_eq!(RatingScale::default().rate(score), expected);
    }

    #[test]
    fn test_rating_monotonic() {
        let scale = RatingScale::default();
        let mut previous = Rating::D.tier();
        for step in 0..=1000 {
            let tier = scale.rate(f64::from(step) / 10.0).tier();
            assert!(tier >= previous);
            previous = tier;
        }
    }

    #[test]
    fn test_rating_scale_validation() {
        RatingScale::default().validate().unwrap();
        let bad = RatingScale {
            a_min: 70.0,
            b_min: 70.0,
            c_min: 55.0,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_rating_labels() {
        assert_eq!(Rating::A.label(), "core");
        assert_eq!(Rating::D.label(), "risk");
        assert_eq!(Rating::from_name("C"), Some(Rating::C));
        assert_eq!(Rating::from_name("E"), None);
    }

    #[test]
    fn test_aggregate_all_ranks_and_neutral_totals() {
        let make = |code: &str, valuation: f64| {
            let mut scores = DimensionScores::default();
            scores.set(Dimension::Valuation, Some(valuation));
            ScoredSecurity {
                snapshot: fixtures::blank(code, "bank"),
                scores,
            }
        };
        let universe = vec![make("B", 60.0), make("A", 90.0), make("C", 60.0)];
        let normalized = Normalizer::default().normalize(&universe).unwrap();

        let aggregator = CompositeAggregator::default_config();
        let composites = aggregator.aggregate_all(&universe, &normalized.rows);

        assert_eq!(composites[1].total_rank, Some(1));
        assert_eq!(composites[0].total_rank, Some(2));
        assert_eq!(composites[2].total_rank, Some(3));
        assert_eq!(composites[1].rating, Some(Rating::A));
        assert_eq!(composites[1].neutral_total_score, Some(100.0));
        assert_eq!(composites[2].neutral_total_score, Some(0.0));
    }

    #[test]
    fn test_zscore_basis_mapping() {
        let normalizer = NormalizerConfig {
            neutral_basis: NeutralBasis::Zscore,
            ..NormalizerConfig::default()
        };
        let aggregator =
            CompositeAggregator::new(DimensionWeights::default(), RatingScale::default(), &normalizer);
        let make = |code: &str, growth: f64| {
            let mut scores = DimensionScores::default();
            scores.set(Dimension::Growth, Some(growth));
            ScoredSecurity {
                snapshot: fixtures::blank(code, "bank"),
                scores,
            }
        };
        let universe = vec![make("A", 10.0), make("B", 20.0), make("C", 30.0)];
        let normalized = Normalizer::default().normalize(&universe).unwrap();

        let inputs: Vec<Option<f64>> = normalized
            .rows
            .iter()
            .map(|n| aggregator.neutral_inputs(n).get(Dimension::Growth))
            .collect();
        // z = -1, 0, 1 mapped to 50 +/- 15
        assert_relative_eq!(inputs[0].unwrap(), 35.0, epsilon = 1e-9);
        assert_relative_eq!(inputs[1].unwrap(), 50.0, epsilon = 1e-9);
        assert_relative_eq!(inputs[2].unwrap(), 65.0, epsilon = 1e-9);
    }

    impl CompositeAggregator {
        fn default_config() -> Self {
            Self::new(
                DimensionWeights::default(),
                RatingScale::default(),
                &NormalizerConfig::default(),
            )
        }
    }
}
