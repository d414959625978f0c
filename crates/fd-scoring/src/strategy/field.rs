//! Named, typed fields that strategy filters can reference.

use derive_more::Display;

use crate::{
    composite::{CompositeScore, Rating},
    model::Metric,
    registry::{Dimension, ScoredSecurity},
};

/// Value type of a [`Field`].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Real number
    Number,
    /// Boolean flag
    Bool,
    /// Letter rating, compared by tier
    Rating,
    /// Free text, equality only
    Text,
}

/// Resolved value of a [`Field`] for one security.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Real number
    Number(f64),
    /// Boolean flag
    Bool(bool),
    /// Letter rating
    Rating(Rating),
    /// Free text
    Text(String),
}

/// What a field is resolved against.
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    /// Inputs and raw sub-scores
    pub security: &'a ScoredSecurity,
    /// Totals and ratings
    pub composite: &'a CompositeScore,
}

/// A filterable field.
///
/// Ratio fundamentals (`roe`, margins, growth, `debt_to_assets`) and
/// `dividend_yield_ttm` are in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Trailing P/E
    PeTtm,
    /// Most-recent-quarter P/B
    PbMrq,
    /// Trailing P/S
    PsTtm,
    /// Market capitalization
    MarketCap,
    /// Close on the as-of date
    Close,
    /// Short moving average (MA60 by default)
    Ma60,
    /// Medium moving average (MA120 by default)
    Ma120,
    /// Long moving average (MA250 by default)
    Ma250,
    /// Close over the short moving average
    PriceVsMa60,
    /// Close over the medium moving average
    PriceVsMa120,
    /// Close over the long moving average
    PriceVsMa250,
    /// Close below the short moving average
    BelowMa60,
    /// Close below the medium moving average
    BelowMa120,
    /// Close below the long moving average
    BelowMa250,
    /// Run length of P/B at or below its trailing percentile threshold
    DaysBelowPbPercentile,
    /// A fundamental metric
    Metric(Metric),
    /// Trailing dividend yield
    DividendYieldTtm,
    /// Distinct recent dividend years
    DividendYears,
    /// Consecutive profitable dividend-paying years
    ProfitDividendYears,
    /// Composite total
    TotalScore,
    /// Industry-neutral composite total
    NeutralTotalScore,
    /// Rating of the composite total
    Rating,
    /// Rating of the industry-neutral total
    NeutralRating,
    /// A dimension sub-score
    Score(Dimension),
    /// Industry label
    Industry,
    /// Special-treatment flag
    IsSt,
    /// Calendar days since listing
    ListedDays,
}

const FILTERABLE_METRICS: [Metric; 9] = [
    Metric::Roe,
    Metric::NetProfitMargin,
    Metric::GrossMargin,
    Metric::RevenueYoy,
    Metric::NetProfitYoy,
    Metric::DebtToAssets,
    Metric::CurrentRatio,
    Metric::QuickRatio,
    Metric::OcfToNetProfit,
];

const fn is_percent(metric: Metric) -> bool {
    matches!(
        metric,
        Metric::Roe
            | Metric::NetProfitMargin
            | Metric::GrossMargin
            | Metric::RevenueYoy
            | Metric::NetProfitYoy
            | Metric::DebtToAssets
    )
}

impl Field {
    /// Parse a field name. `pe`, `pb` and `mv` are accepted as short
    /// aliases of `pe_ttm`, `pb_mrq` and `market_cap`.
    pub fn from_name(name: &str) -> Option<Self> {
        let field = match name {
            "pe_ttm" | "pe" => Self::PeTtm,
            "pb_mrq" | "pb" => Self::PbMrq,
            "ps_ttm" => Self::PsTtm,
            "market_cap" | "mv" => Self::MarketCap,
            "close" => Self::Close,
            "ma60" => Self::Ma60,
            "ma120" => Self::Ma120,
            "ma250" => Self::Ma250,
            "price_vs_ma60" => Self::PriceVsMa60,
            "price_vs_ma120" => Self::PriceVsMa120,
            "price_vs_ma250" => Self::PriceVsMa250,
            "below_ma60" => Self::BelowMa60,
            "below_ma120" => Self::BelowMa120,
            "below_ma250" => Self::BelowMa250,
            "days_below_pb_percentile" => Self::DaysBelowPbPercentile,
            "dividend_yield_ttm" => Self::DividendYieldTtm,
            "dividend_years" => Self::DividendYears,
            "profit_dividend_years" => Self::ProfitDividendYears,
            "total_score" => Self::TotalScore,
            "neutral_total_score" => Self::NeutralTotalScore,
            "rating" => Self::Rating,
            "neutral_rating" => Self::NeutralRating,
            "industry" => Self::Industry,
            "is_st" => Self::IsSt,
            "listed_days" => Self::ListedDays,
            other => {
                if let Some(metric) = FILTERABLE_METRICS.into_iter().find(|m| m.as_str() == other) {
                    Self::Metric(metric)
                } else {
                    let dimension = other.strip_suffix("_score").and_then(Dimension::from_name)?;
                    Self::Score(dimension)
                }
            }
        };
        Some(field)
    }

    /// Value type.
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::BelowMa60 | Self::BelowMa120 | Self::BelowMa250 | Self::IsSt => FieldKind::Bool,
            Self::Rating | Self::NeutralRating => FieldKind::Rating,
            Self::Industry => FieldKind::Text,
            _ => FieldKind::Number,
        }
    }

    /// Value for one security; `None` when the underlying input is null, or
    /// for P/E and P/B when it is not positive.
    pub fn resolve(&self, ctx: &FieldContext<'_>) -> Option<FieldValue> {
        let snapshot = &ctx.security.snapshot;
        let technical = &snapshot.technical;
        let below = |ma: Option<f64>| ma.map(|ma| FieldValue::Bool(snapshot.close < ma));
        let number = |v: Option<f64>| v.filter(|v| v.is_finite()).map(FieldValue::Number);
        // Loss makers and negative book value have no meaningful multiple
        let multiple = |v: Option<f64>| number(v.filter(|v| *v > 0.0));

        match self {
            Self::PeTtm => multiple(snapshot.pe_ttm),
            Self::PbMrq => multiple(snapshot.pb_mrq),
            Self::PsTtm => number(snapshot.ps_ttm),
            Self::MarketCap => number(snapshot.market_cap),
            Self::Close => number(Some(snapshot.close)),
            Self::Ma60 => number(technical.ma_short),
            Self::Ma120 => number(technical.ma_mid),
            Self::Ma250 => number(technical.ma_long),
            Self::PriceVsMa60 => number(snapshot.price_vs(technical.ma_short)),
            Self::PriceVsMa120 => number(snapshot.price_vs(technical.ma_mid)),
            Self::PriceVsMa250 => number(snapshot.price_vs(technical.ma_long)),
            Self::BelowMa60 => below(technical.ma_short),
            Self::BelowMa120 => below(technical.ma_mid),
            Self::BelowMa250 => below(technical.ma_long),
            Self::DaysBelowPbPercentile => number(technical.days_below_pb_percentile.map(f64::from)),
            Self::Metric(metric) => {
                let scale = if is_percent(*metric) { 100.0 } else { 1.0 };
                number(snapshot.metric(*metric).map(|v| v * scale))
            }
            Self::DividendYieldTtm => number(snapshot.dividend.yield_ttm),
            Self::DividendYears => number(Some(f64::from(snapshot.dividend.dividend_years))),
            Self::ProfitDividendYears => {
                number(Some(f64::from(snapshot.dividend.profit_dividend_years)))
            }
            Self::TotalScore => number(ctx.composite.total_score),
            Self::NeutralTotalScore => number(ctx.composite.neutral_total_score),
            Self::Rating => ctx.composite.rating.map(FieldValue::Rating),
            Self::NeutralRating => ctx.composite.neutral_rating.map(FieldValue::Rating),
            Self::Score(dimension) => number(ctx.security.scores.get(*dimension)),
            Self::Industry => Some(FieldValue::Text(snapshot.industry.clone())),
            Self::IsSt => Some(FieldValue::Bool(snapshot.is_st)),
            Self::ListedDays => number(Some(snapshot.listed_days as f64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("pb_mrq", Field::PbMrq)]
    #[case("below_ma250", Field::BelowMa250)]
    #[case("roe", Field::Metric(Metric::Roe))]
    #[case("valuation_score", Field::Score(Dimension::Valuation))]
    #[case("size_liquidity_score", Field::Score(Dimension::SizeLiquidity))]
    #[case("rating", Field::Rating)]
    #[case("pb", Field::PbMrq)]
    #[case("mv", Field::MarketCap)]
    fn test_field_names(#[case] name: &str, #[case] expected: Field) {
        assert_eq!(Field::from_name(name), Some(expected));
    }

    #[rstest]
    #[case("momentum_score")]
    #[case("net_profit")]
    #[case("pb_ratio")]
    fn test_unknown_fields(#[case] name: &str) {
        assert_eq!(Field::from_name(name), None);
    }

    #[test]
    fn test_field_kinds() {
        assert_eq!(Field::IsSt.kind(), FieldKind::Bool);
        assert_eq!(Field::Rating.kind(), FieldKind::Rating);
        assert_eq!(Field::Industry.kind(), FieldKind::Text);
        assert_eq!(Field::Metric(Metric::Roe).kind(), FieldKind::Number);
    }
}
