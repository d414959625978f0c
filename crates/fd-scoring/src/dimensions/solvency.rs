//! Solvency dimension.
//!
//! Leverage is scored lower-is-better; current and quick ratios
//! higher-is-better.

use crate::{
    component::{Component, Input},
    curve::ScoreCurve,
    registry::Dimension,
    traits::{ConfigurableScorer, DataFrequency, DimensionConfig, DimensionScorer},
};

/// Solvency scorer.
///
/// ```text
/// Debt/assets %  steps  <=40 -> 100, <=60 -> 70, else 40   (x2)
/// Current ratio  linear 0.5 -> 0, 1 -> 40, 1.5 -> 70, 2 -> 100
/// Quick ratio    linear 0.3 -> 0, 0.7 -> 40, 1 -> 70, 1.5 -> 100
/// ```
#[derive(Debug, Clone)]
pub struct Solvency {
    config: DimensionConfig,
}

impl Default for Solvency {
    fn default() -> Self {
        Self {
            config: DimensionConfig {
                components: vec![
                    Component::new(
                        Input::DebtToAssets,
                        ScoreCurve::steps_lower(&[(40.0, 100.0), (60.0, 70.0)], 40.0),
                        2.0,
                    ),
                    Component::new(
                        Input::CurrentRatio,
                        ScoreCurve::linear(&[(0.5, 0.0), (1.0, 40.0), (1.5, 70.0), (2.0, 100.0)]),
                        1.0,
                    ),
                    Component::new(
                        Input::QuickRatio,
                        ScoreCurve::linear(&[(0.3, 0.0), (0.7, 40.0), (1.0, 70.0), (1.5, 100.0)]),
                        1.0,
                    ),
                ],
            },
        }
    }
}

impl DimensionScorer for Solvency {
    fn dimension(&self) -> Dimension {
        Dimension::Solvency
    }

    fn description(&self) -> &str {
        "Debt to assets, current ratio and quick ratio"
    }

    fn frequency(&self) -> DataFrequency {
        DataFrequency::Quarterly
    }

    fn components(&self) -> &[Component] {
        &self.config.components
    }
}

impl ConfigurableScorer for Solvency {
    fn with_config(config: DimensionConfig) -> Self {
        Self { config }
    }

    fn config(&self) -> &DimensionConfig {
        &self.config
    }
}
