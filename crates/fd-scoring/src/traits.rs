//! Core trait definitions for dimension scorers.
//!
//! Every dimension implements [`DimensionScorer`], which turns a
//! [`FactorSnapshot`] into a bounded sub-score.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{
    component::{Component, Input, weighted_mean},
    loader::FactorSnapshot,
    registry::Dimension,
};

/// Data frequency of a scorer's inputs.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFrequency {
    /// Daily price and valuation series
    Daily,
    /// Quarterly fundamentals
    Quarterly,
    /// Both daily and quarterly inputs
    Mixed,
}

/// A scorer for one dimension.
///
/// The default [`score`](DimensionScorer::score) is the weighted mean of the
/// component scores with a present input, `None` when no input is present.
pub trait DimensionScorer: Send + Sync + std::fmt::Debug {
    /// Dimension scored.
    fn dimension(&self) -> Dimension;

    /// Human-readable description of what this dimension measures.
    fn description(&self) -> &str;

    /// Frequency of the inputs this scorer reads.
    fn frequency(&self) -> DataFrequency;

    /// Scoring components, in evaluation order.
    fn components(&self) -> &[Component];

    /// Inputs read by this scorer.
    fn inputs(&self) -> Vec<Input> {
        self.components().iter().map(|c| c.input).collect()
    }

    /// Sub-score in [0, 100].
    fn score(&self, snapshot: &FactorSnapshot) -> Option<f64> {
        weighted_mean(
            self.components()
                .iter()
                .map(|c| (c.weight, c.score(snapshot))),
        )
    }
}

/// Component set of a dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionConfig {
    /// Weighted components
    pub components: Vec<Component>,
}

/// A scorer whose components can be replaced at runtime.
pub trait ConfigurableScorer: DimensionScorer + Default {
    /// Create the scorer with the given components.
    fn with_config(config: DimensionConfig) -> Self;

    /// Returns the current configuration.
    fn config(&self) -> &DimensionConfig;
}
