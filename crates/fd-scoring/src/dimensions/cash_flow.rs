//! Cash flow quality dimension.

use crate::{
    component::{Component, Input},
    curve::ScoreCurve,
    registry::Dimension,
    traits::{ConfigurableScorer, DataFrequency, DimensionConfig, DimensionScorer},
};

/// Cash flow scorer: operating cash flow over net profit.
///
/// Earnings fully backed by operating cash (`>= 1.0`) score 100.
#[derive(Debug, Clone)]
pub struct CashFlow {
    config: DimensionConfig,
}

impl Default for CashFlow {
    fn default() -> Self {
        Self {
            config: DimensionConfig {
                components: vec![Component::new(
                    Input::OcfToNetProfit,
                    ScoreCurve::steps_higher(&[(1.0, 100.0), (0.7, 70.0)], 40.0),
                    1.0,
                )],
            },
        }
    }
}

impl DimensionScorer for CashFlow {
    fn dimension(&self) -> Dimension {
        Dimension::CashFlow
    }

    fn description(&self) -> &str {
        "Operating cash flow relative to net profit"
    }

    fn frequency(&self) -> DataFrequency {
        DataFrequency::Quarterly
    }

    fn components(&self) -> &[Component] {
        &self.config.components
    }
}

impl ConfigurableScorer for CashFlow {
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
    use crate::{dimensions::fixtures, model::Metric};
    use rstest::rstest;

    #[rstest]
    #[case(1.3, 100.0)]
    #[case(0.7, 70.0)]
    #[case(-0.2, 40.0)]
    fn test_cash_flow_bands(#[case] ratio: f64, #[case] expected: f64) {
        let snap = fixtures::with_metrics(fixtures::blank("A", "x"), &[(Metric::OcfToNetProfit, ratio)]);
        assert_eq!(CashFlow::default().score(&snap), Some(expected));
    }
}
