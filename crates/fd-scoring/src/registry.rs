//! Scorer registry for discovery and introspection.
//!
//! The registry holds one [`DimensionScorer`] per [`Dimension`] and scores a
//! snapshot across all of them in a fixed dimension order.

use std::collections::BTreeMap;
use std::sync::Arc;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{
    Result, ScoringError,
    component::{Component, Input},
    config::ScoringConfig,
    dimensions::{
        CashFlow, Dividend, Growth, Operation, Profitability, SizeLiquidity, Solvency, Valuation,
    },
    loader::FactorSnapshot,
    traits::{ConfigurableScorer, DataFrequency, DimensionConfig, DimensionScorer},
};

/// Scoring dimension.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Profitability - returns and margins
    Profitability,
    /// Operation - asset and working-capital efficiency
    Operation,
    /// Growth - revenue and profit growth
    Growth,
    /// Solvency - leverage and liquidity ratios
    Solvency,
    /// Cash flow - earnings backed by operating cash
    CashFlow,
    /// Valuation - multiples and price relative to trend
    Valuation,
    /// Dividend - cash returned to shareholders
    Dividend,
    /// Size and liquidity - market value and trading activity
    SizeLiquidity,
}

impl Dimension {
    /// All dimensions, in the fixed evaluation order.
    pub const ALL: [Self; 8] = [
        Self::Profitability,
        Self::Operation,
        Self::Growth,
        Self::Solvency,
        Self::CashFlow,
        Self::Valuation,
        Self::Dividend,
        Self::SizeLiquidity,
    ];

    /// Stable name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Profitability => "profitability",
            Self::Operation => "operation",
            Self::Growth => "growth",
            Self::Solvency => "solvency",
            Self::CashFlow => "cash_flow",
            Self::Valuation => "valuation",
            Self::Dividend => "dividend",
            Self::SizeLiquidity => "size_liquidity",
        }
    }

    /// Name of the sub-score column.
    pub const fn score_column(&self) -> &'static str {
        match self {
            Self::Profitability => "profitability_score",
            Self::Operation => "operation_score",
            Self::Growth => "growth_score",
            Self::Solvency => "solvency_score",
            Self::CashFlow => "cash_flow_score",
            Self::Valuation => "valuation_score",
            Self::Dividend => "dividend_score",
            Self::SizeLiquidity => "size_liquidity_score",
        }
    }

    /// Parse a stable name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == name)
    }

    /// Position in [`Dimension::ALL`].
    pub const fn index(&self) -> usize {
        *self as usize
    }
}

/// Sub-scores of one security, indexed by dimension. Serialized as a map
/// keyed by dimension name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<Dimension, Option<f64>>",
    into = "BTreeMap<Dimension, Option<f64>>"
)]
pub struct DimensionScores([Option<f64>; 8]);

impl DimensionScores {
    /// Sub-score of a dimension.
    pub const fn get(&self, dimension: Dimension) -> Option<f64> {
        self.0[dimension.index()]
    }

    /// Set a sub-score.
    pub const fn set(&mut self, dimension: Dimension, score: Option<f64>) {
        self.0[dimension.index()] = score;
    }

    /// `(dimension, score)` pairs in the fixed dimension order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, Option<f64>)> + '_ {
        Dimension::ALL.into_iter().map(|d| (d, self.get(d)))
    }

    /// Number of dimensions with a score.
    pub fn present(&self) -> usize {
        self.0.iter().filter(|s| s.is_some()).count()
    }
}

impl FromIterator<(Dimension, Option<f64>)> for DimensionScores {
    fn from_iter<I: IntoIterator<Item = (Dimension, Option<f64>)>>(iter: I) -> Self {
        let mut scores = Self::default();
        for (dimension, score) in iter {
            scores.set(dimension, score);
        }
        scores
    }
}

impl From<BTreeMap<Dimension, Option<f64>>> for DimensionScores {
    fn from(map: BTreeMap<Dimension, Option<f64>>) -> Self {
        map.into_iter().collect()
    }
}

impl From<DimensionScores> for BTreeMap<Dimension, Option<f64>> {
    fn from(scores: DimensionScores) -> Self {
        scores.iter().collect()
    }
}

/// A loaded security together with its dimension sub-scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSecurity {
    /// Point-in-time inputs
    pub snapshot: FactorSnapshot,
    /// Raw sub-scores
    pub scores: DimensionScores,
}

/// Metadata for scorer introspection.
#[derive(Debug, Clone, Serialize)]
pub struct ScorerInfo {
    /// Dimension name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Input frequency
    pub frequency: DataFrequency,
    /// Inputs read
    pub inputs: Vec<Input>,
    /// Components in evaluation order
    pub components: Vec<Component>,
}

/// Registry for dimension scorers.
#[derive(Debug, Default)]
pub struct ScorerRegistry {
    scorers: BTreeMap<Dimension, Arc<dyn DimensionScorer>>,
}

impl ScorerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the built-in scorer of every dimension.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(Profitability::default()));
        registry.register(Arc::new(Operation::default()));
        registry.register(Arc::new(Growth::default()));
        registry.register(Arc::new(Solvency::default()));
        registry.register(Arc::new(CashFlow::default()));
        registry.register(Arc::new(Valuation::default()));
        registry.register(Arc::new(Dividend::default()));
        registry.register(Arc::new(SizeLiquidity::default()));

        registry
    }

    /// Built-in scorers with the configured component overrides applied.
    pub fn with_config(config: &ScoringConfig) -> Result<Self> {
        let mut registry = Self::with_defaults();
        for (dimension, components) in &config.overrides {
            if components.is_empty() {
                return Err(ScoringError::config(
                    format!("engine.scoring.{}", dimension.as_str()),
                    "at least one component is required",
                ));
            }
            registry.register(configured(*dimension, components.clone()));
        }
        Ok(registry)
    }

    /// Register a scorer, replacing any scorer of the same dimension.
    pub fn register(&mut self, scorer: Arc<dyn DimensionScorer>) {
        self.scorers.insert(scorer.dimension(), scorer);
    }

    /// Get the scorer of a dimension.
    pub fn get(&self, dimension: Dimension) -> Option<&dyn DimensionScorer> {
        self.scorers.get(&dimension).map(|s| s.as_ref())
    }

    /// Get a scorer by dimension name.
    pub fn by_name(&self, name: &str) -> Option<&dyn DimensionScorer> {
        Dimension::from_name(name).and_then(|d| self.get(d))
    }

    /// Get all scorer metadata, in dimension order.
    pub fn all_info(&self) -> Vec<ScorerInfo> {
        self.scorers
            .values()
            .map(|s| ScorerInfo {
                name: s.dimension().as_str().to_string(),
                description: s.description().to_string(),
                frequency: s.frequency(),
                inputs: s.inputs(),
                components: s.components().to_vec(),
            })
            .collect()
    }

    /// Get all registered dimension names.
    pub fn names(&self) -> Vec<&str> {
        self.scorers.keys().map(|d| d.as_str()).collect()
    }

    /// Score a snapshot on every registered dimension.
    ///
    /// Dimensions without a registered scorer stay null.
    pub fn score(&self, snapshot: &FactorSnapshot) -> DimensionScores {
        self.scorers
            .iter()
            .map(|(dimension, scorer)| (*dimension, scorer.score(snapshot)))
            .collect()
    }

    /// Score a snapshot and keep it alongside its sub-scores.
    pub fn score_security(&self, snapshot: FactorSnapshot) -> ScoredSecurity {
        let scores = self.score(&snapshot);
        ScoredSecurity { snapshot, scores }
    }

    /// Number of registered scorers.
    pub fn len(&self) -> usize {
        self.scorers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.scorers.is_empty()
    }
}

fn configured(dimension: Dimension, components: Vec<Component>) -> Arc<dyn DimensionScorer> {
    let config = DimensionConfig { components };
    match dimension {
        Dimension::Profitability => Arc::new(Profitability::with_config(config)),
        Dimension::Operation => Arc::new(Operation::with_config(config)),
        Dimension::Growth => Arc::new(Growth::with_config(config)),
        Dimension::Solvency => Arc::new(Solvency::with_config(config)),
        Dimension::CashFlow => Arc::new(CashFlow::with_config(config)),
        Dimension::Valuation => Arc::new(Valuation::with_config(config)),
        Dimension::Dividend => Arc::new(Dividend::with_config(config)),
        Dimension::SizeLiquidity => Arc::new(SizeLiquidity::with_config(config)),
    }
}
