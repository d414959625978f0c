//! Size and liquidity dimension.
//!
//! Scored and normalized like every other dimension, but carries no weight in
//! the default composite. Strategies can weight it explicitly.

use crate::{
    component::{Component, Input},
    curve::ScoreCurve,
    registry::Dimension,
    traits::{ConfigurableScorer, DataFrequency, DimensionConfig, DimensionScorer},
};

/// Size/liquidity scorer on log10 market cap and log10 average amount.
#[derive(Debug, Clone)]
pub struct SizeLiquidity {
    config: DimensionConfig,
}

impl Default for SizeLiquidity {
    fn default() -> Self {
        Self {
            config: DimensionConfig {
                components: vec![
                    Component::new(
                        Input::LogMarketCap,
                        ScoreCurve::linear(&[(9.0, 20.0), (11.0, 100.0)]),
                        1.0,
                    ),
                    Component::new(
                        Input::LogAvgAmount,
                        ScoreCurve::linear(&[(7.0, 20.0), (9.0, 100.0)]),
                        1.0,
                    ),
                ],
            },
        }
    }
}

impl DimensionScorer for SizeLiquidity {
    fn dimension(&self) -> Dimension {
        Dimension::SizeLiquidity
    }

    fn description(&self) -> &str {
        "Market capitalization and average traded amount"
    }

    fn frequency(&self) -> DataFrequency {
        DataFrequency::Daily
    }

    fn components(&self) -> &[Component] {
        &self.config.components
    }
}

impl ConfigurableScorer for SizeLiquidity {
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
    use approx::assert_relative_eq;

    #[test]
    fn test_size_liquidity() {
        let mut snap = fixtures::blank("A", "x");
        snap.market_cap = Some(1e10);
        snap.technical.avg_amount = Some(1e9);
        // log10 = 10 -> 60, log10 = 9 -> 100
        assert_relative_eq!(SizeLiquidity::default().score(&snap).unwrap(), 80.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_market_cap_is_missing() {
        let mut snap = fixtures::blank("A", "x");
        snap.market_cap = Some(0.0);
        assert_eq!(SizeLiquidity::default().score(&snap), None);
    }
}
