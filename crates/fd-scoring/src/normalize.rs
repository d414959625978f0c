//! Cross-sectional normalization against industry peers.
//!
//! For every [`PeerField`] the scored universe is partitioned by industry.
//! Within a partition, members with a value are ranked 1..n (best first,
//! ties broken by security code) and standardized to a z-score. Members
//! without a value are left out of the partition entirely, and so are
//! non-positive valuation multiples, which carry no cheapness signal.

use std::collections::BTreeMap;

use derive_more::Display;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    Result, ScoringError,
    config::NormalizerConfig,
    curve::{MAX_SCORE, Polarity},
    model::Metric,
    registry::{Dimension, ScoredSecurity},
    standardize::{partition_zscores, zscore_column},
};

/// A value normalized within the industry.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerField {
    /// Profitability sub-score
    ProfitabilityScore,
    /// Operation sub-score
    OperationScore,
    /// Growth sub-score
    GrowthScore,
    /// Solvency sub-score
    SolvencyScore,
    /// Cash flow sub-score
    CashFlowScore,
    /// Valuation sub-score
    ValuationScore,
    /// Dividend sub-score
    DividendScore,
    /// Size/liquidity sub-score
    SizeLiquidityScore,
    /// Trailing P/E
    PeTtm,
    /// Most-recent-quarter P/B
    PbMrq,
    /// Return on equity
    Roe,
    /// Trailing dividend yield
    DividendYieldTtm,
}

impl PeerField {
    /// All normalized fields, in a fixed order.
    pub const ALL: [Self; 12] = [
        Self::ProfitabilityScore,
        Self::OperationScore,
        Self::GrowthScore,
        Self::SolvencyScore,
        Self::CashFlowScore,
        Self::ValuationScore,
        Self::DividendScore,
        Self::SizeLiquidityScore,
        Self::PeTtm,
        Self::PbMrq,
        Self::Roe,
        Self::DividendYieldTtm,
    ];

    /// Field normalizing a dimension sub-score.
    pub const fn for_dimension(dimension: Dimension) -> Self {
        match dimension {
            Dimension::Profitability => Self::ProfitabilityScore,
            Dimension::Operation => Self::OperationScore,
            Dimension::Growth => Self::GrowthScore,
            Dimension::Solvency => Self::SolvencyScore,
            Dimension::CashFlow => Self::CashFlowScore,
            Dimension::Valuation => Self::ValuationScore,
            Dimension::Dividend => Self::DividendScore,
            Dimension::SizeLiquidity => Self::SizeLiquidityScore,
        }
    }

    /// Stable column name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProfitabilityScore => Dimension::Profitability.score_column(),
            Self::OperationScore => Dimension::Operation.score_column(),
            Self::GrowthScore => Dimension::Growth.score_column(),
            Self::SolvencyScore => Dimension::Solvency.score_column(),
            Self::CashFlowScore => Dimension::CashFlow.score_column(),
            Self::ValuationScore => Dimension::Valuation.score_column(),
            Self::DividendScore => Dimension::Dividend.score_column(),
            Self::SizeLiquidityScore => Dimension::SizeLiquidity.score_column(),
            Self::PeTtm => "pe_ttm",
            Self::PbMrq => "pb_mrq",
            Self::Roe => "roe",
            Self::DividendYieldTtm => "dividend_yield_ttm",
        }
    }

    /// Direction in which the field improves; rank 1 is the best value.
    pub const fn polarity(&self) -> Polarity {
        match self {
            Self::PeTtm | Self::PbMrq => Polarity::LowerIsBetter,
            _ => Polarity::HigherIsBetter,
        }
    }

    /// Position in [`PeerField::ALL`].
    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// Whether only strictly positive values are meaningful.
    pub const fn positive_only(&self) -> bool {
        matches!(self, Self::PeTtm | Self::PbMrq)
    }

    /// Value of this field for one security.
    pub fn value(&self, security: &ScoredSecurity) -> Option<f64> {
        let snapshot = &security.snapshot;
        let value = match self {
            Self::ProfitabilityScore => security.scores.get(Dimension::Profitability),
            Self::OperationScore => security.scores.get(Dimension::Operation),
            Self::GrowthScore => security.scores.get(Dimension::Growth),
            Self::SolvencyScore => security.scores.get(Dimension::Solvency),
            Self::CashFlowScore => security.scores.get(Dimension::CashFlow),
            Self::ValuationScore => security.scores.get(Dimension::Valuation),
            Self::DividendScore => security.scores.get(Dimension::Dividend),
            Self::SizeLiquidityScore => security.scores.get(Dimension::SizeLiquidity),
            Self::PeTtm => snapshot.pe_ttm,
            Self::PbMrq => snapshot.pb_mrq,
            Self::Roe => snapshot.metric(Metric::Roe),
            Self::DividendYieldTtm => snapshot.dividend.yield_ttm,
        };
        value.filter(|v| v.is_finite() && (!self.positive_only() || *v > 0.0))
    }
}

/// Standing of one value within its industry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerStats {
    /// 1 = best within the industry, null when the value is null or the
    /// industry is below the minimum peer group
    pub rank: Option<u32>,
    /// Industry members with a value for this field
    pub peers: u32,
    /// `100 * (n - rank) / (n - 1)`, null below the minimum peer group
    pub percentile: Option<f64>,
    /// Within-industry z-score of the raw value
    pub zscore: Option<f64>,
}

/// Peer statistics of one security for every [`PeerField`]. Serialized as a
/// map keyed by field name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<PeerField, PeerStats>",
    into = "BTreeMap<PeerField, PeerStats>"
)]
pub struct NormalizedScores([PeerStats; 12]);

impl From<BTreeMap<PeerField, PeerStats>> for NormalizedScores {
    fn from(map: BTreeMap<PeerField, PeerStats>) -> Self {
        let mut scores = Self::default();
        for (field, stats) in map {
            *scores.get_mut(field) = stats;
        }
        scores
    }
}

impl From<NormalizedScores> for BTreeMap<PeerField, PeerStats> {
    fn from(scores: NormalizedScores) -> Self {
        scores.iter().map(|(field, stats)| (field, *stats)).collect()
    }
}

impl NormalizedScores {
    /// Statistics of a field.
    pub const fn get(&self, field: PeerField) -> &PeerStats {
        &self.0[field.index()]
    }

    const fn get_mut(&mut self, field: PeerField) -> &mut PeerStats {
        &mut self.0[field.index()]
    }

    /// Statistics of a dimension sub-score.
    pub const fn dimension(&self, dimension: Dimension) -> &PeerStats {
        self.get(PeerField::for_dimension(dimension))
    }

    /// `(field, stats)` pairs in the fixed field order.
    pub fn iter(&self) -> impl Iterator<Item = (PeerField, &PeerStats)> + '_ {
        PeerField::ALL.into_iter().map(|f| (f, self.get(f)))
    }
}

/// Result of normalizing one date's universe.
#[derive(Debug, Default)]
pub struct Normalization {
    /// Peer statistics, aligned with the input securities
    pub rows: Vec<NormalizedScores>,
    /// One [`ScoringError::InsufficientPeerGroup`] per undersized
    /// (industry, field) partition
    pub shortfalls: Vec<ScoringError>,
}

/// Cross-sectional normalizer.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    /// Create a normalizer.
    pub const fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Normalize every [`PeerField`] across `securities`.
    pub fn normalize(&self, securities: &[ScoredSecurity]) -> Result<Normalization> {
        let mut rows = vec![NormalizedScores::default(); securities.len()];
        let mut shortfalls = Vec::new();

        let zscores = self.zscores(securities)?;

        for field in PeerField::ALL {
            let values: Vec<Option<f64>> = securities.iter().map(|s| field.value(s)).collect();

            let mut partitions: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
            for (idx, security) in securities.iter().enumerate() {
                if values[idx].is_some() {
                    partitions
                        .entry(security.snapshot.industry.as_str())
                        .or_default()
                        .push(idx);
                }
            }

            for (industry, mut members) in partitions {
                let n = members.len();
                if n < self.config.min_peer_group {
                    debug!(industry, field = field.as_str(), size = n, "peer group too small");
                    shortfalls.push(ScoringError::InsufficientPeerGroup {
                        industry: industry.to_string(),
                        field: field.as_str().to_string(),
                        size: n,
                        required: self.config.min_peer_group,
                    });
                }

                members.sort_by(|&a, &b| {
                    let (va, vb) = (values[a].unwrap_or_default(), values[b].unwrap_or_default());
                    let by_value = match field.polarity() {
                        Polarity::HigherIsBetter => vb.total_cmp(&va),
                        Polarity::LowerIsBetter => va.total_cmp(&vb),
                    };
                    by_value.then_with(|| securities[a].snapshot.code.cmp(&securities[b].snapshot.code))
                });

                let peers = u32::try_from(n).unwrap_or(u32::MAX);
                let enough = n >= self.config.min_peer_group;
                for (position, &idx) in members.iter().enumerate() {
                    let rank = enough.then(|| u32::try_from(position + 1).unwrap_or(u32::MAX));
                    let percentile =
                        enough.then(|| MAX_SCORE * (n - position - 1) as f64 / (n - 1) as f64);
                    *rows[idx].get_mut(field) = PeerStats {
                        rank,
                        peers,
                        percentile,
                        zscore: zscores[field.index()][idx],
                    };
                }
            }
        }

        info!(
            securities = securities.len(),
            shortfalls = shortfalls.len(),
            "cross-section normalized"
        );
        Ok(Normalization { rows, shortfalls })
    }

    /// Z-scores per field, each aligned with `securities`.
    fn zscores(&self, securities: &[ScoredSecurity]) -> Result<Vec<Vec<Option<f64>>>> {
        let mut columns = Vec::with_capacity(PeerField::ALL.len() + 1);
        let industries: Vec<&str> = securities
            .iter()
            .map(|s| s.snapshot.industry.as_str())
            .collect();
        columns.push(Column::new("industry".into(), industries));
        for field in PeerField::ALL {
            let values: Vec<Option<f64>> = securities.iter().map(|s| field.value(s)).collect();
            columns.push(Column::new(field.as_str().into(), values));
        }
        let frame = DataFrame::new(columns)?;

        let names: Vec<&str> = PeerField::ALL.iter().map(|f| f.as_str()).collect();
        let standardized = partition_zscores(
            &frame,
            &names,
            "industry",
            self.config.min_peer_group,
            self.config.zero_variance_epsilon,
        )?;

        PeerField::ALL
            .iter()
            .map(|field| -> Result<Vec<Option<f64>>> {
                let z = standardized.column(&zscore_column(field.as_str()))?.f64()?;
                Ok(z.into_iter().collect())
            })
            .collect()
    }
}
