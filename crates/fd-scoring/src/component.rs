//! Scoring components: one raw input, one curve, one weight.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Result, ScoringError, curve::ScoreCurve, loader::FactorSnapshot, model::Metric};

/// A scoring-ready input read from a [`FactorSnapshot`].
///
/// Fundamental ratios stored as fractions are exposed in percent so curves
/// read like the scorecard tables they come from.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Input {
    /// Return on equity, percent
    Roe,
    /// Net profit margin, percent
    NetProfitMargin,
    /// Gross margin, percent
    GrossMargin,
    /// Total asset turnover
    AssetTurnover,
    /// Inventory turnover
    InventoryTurnover,
    /// Receivable turnover
    ReceivableTurnover,
    /// Net profit growth, percent
    NetProfitYoy,
    /// Revenue growth, percent
    RevenueYoy,
    /// Liabilities over assets, percent
    DebtToAssets,
    /// Current ratio
    CurrentRatio,
    /// Quick ratio
    QuickRatio,
    /// Operating cash flow over net profit
    OcfToNetProfit,
    /// Trailing P/E
    PeTtm,
    /// Most-recent-quarter P/B
    PbMrq,
    /// Close over the short moving average
    PriceVsMaShort,
    /// Close over the medium moving average
    PriceVsMaMid,
    /// Close over the long moving average
    PriceVsMaLong,
    /// Consecutive days with P/B at or below its trailing percentile threshold
    DaysBelowPbPercentile,
    /// Trailing dividend yield, percent
    DividendYieldTtm,
    /// log10 of market capitalization
    LogMarketCap,
    /// log10 of average daily traded amount
    LogAvgAmount,
}

impl Input {
    /// Resolve the input for one security.
    pub fn value(&self, snapshot: &FactorSnapshot) -> Option<f64> {
        let pct = |m: Metric| snapshot.metric(m).map(|v| v * 100.0);
        let value = match self {
            Self::Roe => pct(Metric::Roe),
            Self::NetProfitMargin => pct(Metric::NetProfitMargin),
            Self::GrossMargin => pct(Metric::GrossMargin),
            Self::AssetTurnover => snapshot.metric(Metric::AssetTurnover),
            Self::InventoryTurnover => snapshot.metric(Metric::InventoryTurnover),
            Self::ReceivableTurnover => snapshot.metric(Metric::ReceivableTurnover),
            Self::NetProfitYoy => pct(Metric::NetProfitYoy),
            Self::RevenueYoy => pct(Metric::RevenueYoy),
            Self::DebtToAssets => pct(Metric::DebtToAssets),
            Self::CurrentRatio => snapshot.metric(Metric::CurrentRatio),
            Self::QuickRatio => snapshot.metric(Metric::QuickRatio),
            Self::OcfToNetProfit => snapshot.metric(Metric::OcfToNetProfit),
            Self::PeTtm => snapshot.pe_ttm,
            Self::PbMrq => snapshot.pb_mrq,
            Self::PriceVsMaShort => snapshot.price_vs(snapshot.technical.ma_short),
            Self::PriceVsMaMid => snapshot.price_vs(snapshot.technical.ma_mid),
            Self::PriceVsMaLong => snapshot.price_vs(snapshot.technical.ma_long),
            Self::DaysBelowPbPercentile => snapshot
                .technical
                .days_below_pb_percentile
                .map(f64::from),
            Self::DividendYieldTtm => snapshot.dividend.yield_ttm,
            Self::LogMarketCap => snapshot.market_cap.filter(|v| *v > 0.0).map(f64::log10),
            Self::LogAvgAmount => snapshot
                .technical
                .avg_amount
                .filter(|v| *v > 0.0)
                .map(f64::log10),
        };
        value.filter(|v| v.is_finite())
    }
}

/// One weighted scoring rule inside a dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Raw input
    pub input: Input,
    /// Curve applied to the input
    pub curve: ScoreCurve,
    /// Relative weight within the dimension
    #[serde(default = "default_weight")]
    pub weight: f64,
}

const fn default_weight() -> f64 {
    1.0
}

impl Component {
    /// Create a component.
    pub const fn new(input: Input, curve: ScoreCurve, weight: f64) -> Self {
        Self {
            input,
            curve,
            weight,
        }
    }

    /// Score this component, `None` when the input is missing.
    pub fn score(&self, snapshot: &FactorSnapshot) -> Option<f64> {
        self.input
            .value(snapshot)
            .and_then(|v| self.curve.evaluate(v))
    }

    /// Check weight and curve.
    pub fn validate(&self, scope: &str) -> Result<()> {
        if !(self.weight.is_finite() && self.weight > 0.0) {
            return Err(ScoringError::config(
                scope,
                format!("component {} has non-positive weight {}", self.input, self.weight),
            ));
        }
        self.curve.validate(scope)
    }
}

/// Weighted mean over entries with a present score, renormalized by the
/// weights actually applied. `None` when nothing contributes.
///
/// Entries are accumulated in iteration order, so a fixed order gives
/// bit-identical results.
pub fn weighted_mean(entries: impl IntoIterator<Item = (f64, Option<f64>)>) -> Option<f64> {
    let mut weighted = 0.0;
    let mut applied = 0.0;
    for (weight, score) in entries {
        if let Some(score) = score
            && weight > 0.0
        {
            weighted += weight * score;
            applied += weight;
        }
    }
    (applied > 0.0).then(|| weighted / applied)
}
