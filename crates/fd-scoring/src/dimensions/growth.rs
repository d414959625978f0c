//! Growth dimension.
//!
//! Year-over-year growth of net profit and revenue, scored on the same
//! banded table.

use crate::{
    component::{Component, Input},
    curve::ScoreCurve,
    registry::Dimension,
    traits::{ConfigurableScorer, DataFrequency, DimensionConfig, DimensionScorer},
};

fn growth_curve() -> ScoreCurve {
    ScoreCurve::steps_higher(&[(30.0, 100.0), (15.0, 70.0), (5.0, 50.0)], 30.0)
}

/// Growth scorer.
#[derive(Debug, Clone)]
pub struct Growth {
    config: DimensionConfig,
}

impl Default for Growth {
    fn default() -> Self {
        Self {
            config: DimensionConfig {
                components: vec![
                    Component::new(Input::NetProfitYoy, growth_curve(), 1.0),
                    Component::new(Input::RevenueYoy, growth_curve(), 1.0),
                ],
            },
        }
    }
}

impl DimensionScorer for Growth {
    fn dimension(&self) -> Dimension {
        Dimension::Growth
    }

    fn description(&self) -> &str {
        "Year-over-year net profit and revenue growth"
    }

    fn frequency(&self) -> DataFrequency {
        DataFrequency::Quarterly
    }

    fn components(&self) -> &[Component] {
        &self.config.components
    }
}

impl ConfigurableScorer for Growth {
    fn with_config(config: DimensionConfig) -> Self {
        Self { config }
    }

    fn config(&self) -> &DimensionConfig {
        &self.config
    }
}
