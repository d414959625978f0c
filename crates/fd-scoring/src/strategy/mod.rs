//! Versioned strategy configurations.
//!
//! A strategy is a stored record: a type tag, a JSON filter spec, a JSON
//! weight spec and a few ordering knobs. Records are validated into a
//! [`StrategyConfig`] per run; a malformed record fails only its own
//! strategy.

pub mod field;
pub mod filter;

use std::collections::BTreeMap;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    Result, ScoringError,
    composite::{CompositeScore, DimensionWeights},
    registry::{Dimension, ScoredSecurity},
};

pub use field::{Field, FieldContext, FieldKind, FieldValue};
pub use filter::{Comparison, FilterSpec, Predicate};

/// Strategy record as held by the configuration store.
///
/// JSON specs are kept as text so a malformed spec is reported against its
/// own strategy instead of failing the whole read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecord {
    /// Unique strategy code
    pub code: String,
    /// Display name
    pub name: String,
    /// Strategy type tag
    pub strategy_type: String,
    /// JSON filter spec
    pub filters: String,
    /// JSON weight spec, dimension name to coefficient
    pub weights: String,
    /// `default` or `industry_neutral`
    pub score_basis: String,
    /// Candidate cap, if any
    pub max_candidates: Option<i64>,
    /// Whether the strategy runs
    pub active: bool,
    /// Display order
    pub display_order: i32,
    /// Configuration version
    pub version: u32,
}

impl StrategyRecord {
    /// An active `custom` record with the given filter spec and no weights.
    pub fn new(code: impl Into<String>, filters: &serde_json::Value) -> Self {
        let code = code.into();
        Self {
            name: code.clone(),
            code,
            strategy_type: StrategyType::Custom.as_str().to_string(),
            filters: filters.to_string(),
            weights: "{}".to_string(),
            score_basis: ScoreBasis::Default.as_str().to_string(),
            max_candidates: None,
            active: true,
            display_order: 0,
            version: 1,
        }
    }
}

/// Strategies installed into an empty configuration store.
pub fn default_strategies() -> Vec<StrategyRecord> {
    let make = |code: &str,
                name: &str,
                strategy_type: StrategyType,
                filters: serde_json::Value,
                weights: serde_json::Value,
                score_basis: ScoreBasis,
                display_order: i32| StrategyRecord {
        code: code.to_string(),
        name: name.to_string(),
        strategy_type: strategy_type.as_str().to_string(),
        filters: filters.to_string(),
        weights: weights.to_string(),
        score_basis: score_basis.as_str().to_string(),
        max_candidates: Some(50),
        active: true,
        display_order,
        version: 1,
    };

    vec![
        make(
            "low_pb_value",
            "Low P/B below long-term trend",
            StrategyType::Value,
            json!({"pb_max": 1.0, "mv_min": 1e10, "below_ma250": true}),
            json!({"valuation": 2, "dividend": 1, "solvency": 1}),
            ScoreBasis::Default,
            10,
        ),
        make(
            "steady_dividend",
            "Steady dividend payers",
            StrategyType::Dividend,
            json!({"dividend_yield_ttm_min": 3.0, "profit_dividend_years_min": 3, "is_st": false}),
            json!({"dividend": 2, "cash_flow": 1, "valuation": 1}),
            ScoreBasis::Default,
            20,
        ),
        make(
            "quality_leaders",
            "High-quality industry leaders",
            StrategyType::Quality,
            json!({"roe_min": 15.0, "debt_to_assets_max": 60.0, "is_st": false}),
            json!({"profitability": 2, "cash_flow": 1, "solvency": 1}),
            ScoreBasis::IndustryNeutral,
            30,
        ),
        make(
            "growth_momentum",
            "Sustained revenue and profit growth",
            StrategyType::Growth,
            json!({"revenue_yoy_min": 15.0, "net_profit_yoy_min": 15.0, "is_st": false}),
            json!({"growth": 2, "profitability": 1}),
            ScoreBasis::Default,
            40,
        ),
        make(
            "core_rated",
            "Core and steady rated names",
            StrategyType::Composite,
            json!({"neutral_rating_min": "B", "is_st": false}),
            json!({}),
            ScoreBasis::IndustryNeutral,
            50,
        ),
    ]
}

/// Descriptive strategy category; does not change evaluation.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    /// Cheap relative to fundamentals
    Value,
    /// Profitable and financially sound
    Quality,
    /// Steady cash returns
    Dividend,
    /// Expanding revenue and profit
    Growth,
    /// Balanced across dimensions
    Composite,
    /// Anything else
    Custom,
}

impl StrategyType {
    /// Stable name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Quality => "quality",
            Self::Dividend => "dividend",
            Self::Growth => "growth",
            Self::Composite => "composite",
            Self::Custom => "custom",
        }
    }

    /// Parse a stable name.
    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::Value,
            Self::Quality,
            Self::Dividend,
            Self::Growth,
            Self::Composite,
            Self::Custom,
        ]
        .into_iter()
        .find(|t| t.as_str() == name)
    }
}

/// Which sub-scores a strategy score is computed from.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBasis {
    /// Raw dimension sub-scores
    #[default]
    Default,
    /// Industry-neutral inputs
    IndustryNeutral,
}

impl ScoreBasis {
    /// Stable name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::IndustryNeutral => "industry_neutral",
        }
    }

    /// Parse a stable name; an empty string means the default.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "" | "default" => Some(Self::Default),
            "industry_neutral" => Some(Self::IndustryNeutral),
            _ => None,
        }
    }
}

/// A validated strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    /// Unique strategy code
    pub code: String,
    /// Display name
    pub name: String,
    /// Category
    pub strategy_type: StrategyType,
    /// Parsed filters
    pub filters: FilterSpec,
    /// Strategy weights; `None` means the engine's default weights
    pub weights: Option<DimensionWeights>,
    /// Basis of the strategy score
    pub score_basis: ScoreBasis,
    /// Candidate cap
    pub max_candidates: Option<usize>,
    /// Whether the strategy runs
    pub active: bool,
    /// Display order
    pub display_order: i32,
    /// Configuration version
    pub version: u32,
}

impl StrategyConfig {
    /// Validate a stored record.
    pub fn from_record(record: &StrategyRecord) -> Result<Self> {
        let scope = record.code.as_str();
        if scope.trim().is_empty() {
            return Err(ScoringError::config("strategy", "strategy code is empty"));
        }

        let strategy_type = StrategyType::from_name(&record.strategy_type).ok_or_else(|| {
            ScoringError::config(scope, format!("unknown strategy_type `{}`", record.strategy_type))
        })?;
        let score_basis = ScoreBasis::from_name(&record.score_basis).ok_or_else(|| {
            ScoringError::config(scope, format!("unknown score_basis `{}`", record.score_basis))
        })?;

        let filters = parse_json(scope, "filters", &record.filters)?;
        let filters = FilterSpec::parse(scope, &filters)?;
        let weights = parse_weights(scope, &record.weights)?;

        let max_candidates = match record.max_candidates {
            None => None,
            Some(n) if n > 0 => usize::try_from(n).ok(),
            Some(n) => {
                return Err(ScoringError::config(
                    scope,
                    format!("max_candidates must be positive, got {n}"),
                ));
            }
        };

        Ok(Self {
            code: record.code.clone(),
            name: record.name.clone(),
            strategy_type,
            filters,
            weights,
            score_basis,
            max_candidates,
            active: record.active,
            display_order: record.display_order,
            version: record.version,
        })
    }

    /// Strategy score of one security.
    ///
    /// The weighted mean, renormalized over present inputs, of either the raw
    /// sub-scores or the industry-neutral inputs.
    pub fn score(
        &self,
        default_weights: &DimensionWeights,
        security: &ScoredSecurity,
        composite: &CompositeScore,
    ) -> Option<f64> {
        let weights = self.weights.as_ref().unwrap_or(default_weights);
        match self.score_basis {
            ScoreBasis::Default => weights.combine(&security.scores),
            ScoreBasis::IndustryNeutral => weights.combine(&composite.neutral_inputs),
        }
    }
}

fn parse_json(scope: &str, what: &str, text: &str) -> Result<serde_json::Value> {
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(text)
        .map_err(|e| ScoringError::config(scope, format!("{what} is not valid JSON: {e}")))
}

fn parse_weights(scope: &str, text: &str) -> Result<Option<DimensionWeights>> {
    let raw: Option<BTreeMap<String, f64>> = match parse_json(scope, "weights", text)? {
        serde_json::Value::Null => None,
        value => Some(serde_json::from_value(value).map_err(|e| {
            ScoringError::config(scope, format!("weights must map dimensions to numbers: {e}"))
        })?),
    };
    let Some(raw) = raw.filter(|m| !m.is_empty()) else {
        return Ok(None);
    };

    let mut weights = DimensionWeights::zero();
    for (name, weight) in raw {
        let dimension = Dimension::from_name(&name)
            .ok_or_else(|| ScoringError::config(scope, format!("unknown dimension `{name}` in weights")))?;
        weights = weights.with(dimension, weight);
    }
    weights.validate(scope)?;
    Ok(Some(weights))
}
