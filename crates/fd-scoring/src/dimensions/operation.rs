//! Operating efficiency dimension.

use crate::{
    component::{Component, Input},
    curve::ScoreCurve,
    registry::Dimension,
    traits::{ConfigurableScorer, DataFrequency, DimensionConfig, DimensionScorer},
};

/// Operating efficiency scorer.
///
/// Total asset turnover dominates (`>=1.2 -> 100`, `>=0.8 -> 70`, else 40,
/// weight 2); inventory and receivable turnover refine it.
#[derive(Debug, Clone)]
pub struct Operation {
    config: DimensionConfig,
}

impl Default for Operation {
    fn default() -> Self {
        Self {
            config: DimensionConfig {
                components: vec![
                    Component::new(
                        Input::AssetTurnover,
                        ScoreCurve::steps_higher(&[(1.2, 100.0), (0.8, 70.0)], 40.0),
                        2.0,
                    ),
                    Component::new(
                        Input::InventoryTurnover,
                        ScoreCurve::linear(&[(0.0, 0.0), (2.0, 40.0), (6.0, 80.0), (12.0, 100.0)]),
                        1.0,
                    ),
                    Component::new(
                        Input::ReceivableTurnover,
                        ScoreCurve::linear(&[(0.0, 0.0), (4.0, 40.0), (10.0, 80.0), (20.0, 100.0)]),
                        1.0,
                    ),
                ],
            },
        }
    }
}

impl DimensionScorer for Operation {
    fn dimension(&self) -> Dimension {
        Dimension::Operation
    }

    fn description(&self) -> &str {
        "Asset, inventory and receivable turnover"
    }

    fn frequency(&self) -> DataFrequency {
        DataFrequency::Quarterly
    }

    fn components(&self) -> &[Component] {
        &self.config.components
    }
}

impl ConfigurableScorer for Operation {
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
    #[case(1.5, 100.0)]
    #[case(0.9, 70.0)]
    #[case(0.3, 40.0)]
    fn test_asset_turnover_bands(#[case] turnover: f64, #[case] expected: f64) {
        let snap = fixtures::with_metrics(
            fixtures::blank("A", "retail"),
            &[(Metric::AssetTurnover, turnover)],
        );
        assert_eq!(Operation::default().score(&snap), Some(expected));
    }

    #[test]
    fn test_inventory_turnover_missing_for_banks() {
        let snap = fixtures::with_metrics(
            fixtures::blank("A", "bank"),
            &[(Metric::AssetTurnover, 0.05), (Metric::ReceivableTurnover, 20.0)],
        );
        // (2 * 40 + 100) / 3
        assert_eq!(Operation::default().score(&snap), Some(60.0));
    }
}
