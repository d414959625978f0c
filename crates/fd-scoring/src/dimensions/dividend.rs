//! Dividend dimension.

use crate::{
    component::{Component, Input},
    curve::ScoreCurve,
    registry::Dimension,
    traits::{ConfigurableScorer, DataFrequency, DimensionConfig, DimensionScorer},
};

/// Dividend scorer: trailing cash dividend yield in percent.
///
/// A security that paid nothing in the trailing window has no yield and
/// therefore no dividend sub-score.
#[derive(Debug, Clone)]
pub struct Dividend {
    config: DimensionConfig,
}

impl Default for Dividend {
    fn default() -> Self {
        Self {
            config: DimensionConfig {
                components: vec![Component::new(
                    Input::DividendYieldTtm,
                    ScoreCurve::steps_higher(&[(6.0, 100.0), (4.0, 70.0)], 40.0),
                    1.0,
                )],
            },
        }
    }
}

impl DimensionScorer for Dividend {
    fn dimension(&self) -> Dimension {
        Dimension::Dividend
    }

    fn description(&self) -> &str {
        "Trailing twelve-month cash dividend yield"
    }

    fn frequency(&self) -> DataFrequency {
        DataFrequency::Daily
    }

    fn components(&self) -> &[Component] {
        &self.config.components
    }
}

impl ConfigurableScorer for Dividend {
    fn with_config(config: DimensionConfig) -> Self {
        Self { config }
    }

    fn config(&self) -> &DimensionConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::fixtures;

    #[test]
    fn test_dividend_yield_bands() {
        let mut snap = fixtures::blank("A", "utility");
        snap.dividend.yield_ttm = Some(4.5);
        assert_eq!(Dividend::default().score(&snap), Some(70.0));

        snap.dividend.yield_ttm = None;
        assert_eq!(Dividend::default().score(&snap), None);
    }
}
