//! Profitability dimension.
//!
//! Rewards companies that earn high returns on equity with healthy margins.

use crate::{
    component::{Component, Input},
    curve::ScoreCurve,
    registry::Dimension,
    traits::{ConfigurableScorer, DataFrequency, DimensionConfig, DimensionScorer},
};

/// Profitability scorer.
///
/// Components:
/// ```text
/// ROE %          steps  >=20 -> 100, >=15 -> 80, >=10 -> 60, >=5 -> 40, else 20   (x2)
/// Net margin %   linear 0 -> 0, 5 -> 40, 15 -> 80, 30 -> 100
/// Gross margin % linear 0 -> 0, 20 -> 40, 40 -> 80, 60 -> 100
/// ```
#[derive(Debug, Clone)]
pub struct Profitability {
    config: DimensionConfig,
}

impl Default for Profitability {
    fn default() -> Self {
        Self {
            config: DimensionConfig {
                components: vec![
                    Component::new(
                        Input::Roe,
                        ScoreCurve::steps_higher(
                            &[(20.0, 100.0), (15.0, 80.0), (10.0, 60.0), (5.0, 40.0)],
                            20.0,
                        ),
                        2.0,
                    ),
                    Component::new(
                        Input::NetProfitMargin,
                        ScoreCurve::linear(&[(0.0, 0.0), (5.0, 40.0), (15.0, 80.0), (30.0, 100.0)]),
                        1.0,
                    ),
                    Component::new(
                        Input::GrossMargin,
                        ScoreCurve::linear(&[(0.0, 0.0), (20.0, 40.0), (40.0, 80.0), (60.0, 100.0)]),
                        1.0,
                    ),
                ],
            },
        }
    }
}

impl DimensionScorer for Profitability {
    fn dimension(&self) -> Dimension {
        Dimension::Profitability
    }

    fn description(&self) -> &str {
        "Return on equity, net margin and gross margin"
    }

    fn frequency(&self) -> DataFrequency {
        DataFrequency::Quarterly
    }

    fn components(&self) -> &[Component] {
        &self.config.components
    }
}

impl ConfigurableScorer for Profitability {
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
    use approx::assert_relative_eq;

    #[test]
    fn test_profitability_metadata() {
        let scorer = Profitability::default();
        assert_eq!(scorer.dimension(), Dimension::Profitability);
        assert_eq!(scorer.frequency(), DataFrequency::Quarterly);
        assert_eq!(
            scorer.inputs(),
            vec![Input::Roe, Input::NetProfitMargin, Input::GrossMargin]
        );
    }

    #[test]
    fn test_roe_only() {
        // ROE 18% lands in the 15% band
        let snap = fixtures::with_metrics(fixtures::blank("A", "bank"), &[(Metric::Roe, 0.18)]);
        assert_relative_eq!(Profitability::default().score(&snap).unwrap(), 80.0);
    }

    #[test]
    fn test_weighted_components() {
        let snap = fixtures::with_metrics(
            fixtures::blank("A", "bank"),
            &[
                (Metric::Roe, 0.22),
                (Metric::NetProfitMargin, 0.10),
                (Metric::GrossMargin, 0.30),
            ],
        );
        // (2 * 100 + 60 + 60) / 4
        assert_relative_eq!(Profitability::default().score(&snap).unwrap(), 80.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_fundamentals_is_null() {
        assert_eq!(Profitability::default().score(&fixtures::blank("A", "bank")), None);
    }
}
