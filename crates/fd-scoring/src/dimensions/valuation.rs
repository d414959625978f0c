//! Valuation and technical dimension.
//!
//! Combines the valuation multiples with where price sits relative to its
//! moving averages and how long P/B has stayed in its cheap zone.

use crate::{
    component::{Component, Input},
    curve::ScoreCurve,
    registry::Dimension,
    traits::{ConfigurableScorer, DataFrequency, DimensionConfig, DimensionScorer},
};

fn trend_curve() -> ScoreCurve {
    ScoreCurve::linear(&[(0.8, 100.0), (1.0, 60.0), (1.2, 20.0)])
}

/// Valuation/technical scorer.
///
/// ```text
/// P/E TTM          steps  <=10 -> 100, <=20 -> 70, <=40 -> 40, else 20; loss -> 0   (x2)
/// P/B MRQ          steps  <=1 -> 100, <=2 -> 70, <=4 -> 40, else 20                 (x2)
/// close / MA60     linear 0.8 -> 100, 1.0 -> 60, 1.2 -> 20
/// close / MA120    same
/// close / MA250    same
/// days below P/B q linear 0 -> 0, 60 -> 100
/// ```
#[derive(Debug, Clone)]
pub struct Valuation {
    config: DimensionConfig,
}

impl Default for Valuation {
    fn default() -> Self {
        Self {
            config: DimensionConfig {
                components: vec![
                    Component::new(
                        Input::PeTtm,
                        ScoreCurve::steps_lower(&[(10.0, 100.0), (20.0, 70.0), (40.0, 40.0)], 20.0)
                            .with_non_positive(0.0),
                        2.0,
                    ),
                    Component::new(
                        Input::PbMrq,
                        ScoreCurve::steps_lower(&[(1.0, 100.0), (2.0, 70.0), (4.0, 40.0)], 20.0),
                        2.0,
                    ),
                    Component::new(Input::PriceVsMaShort, trend_curve(), 1.0),
                    Component::new(Input::PriceVsMaMid, trend_curve(), 1.0),
                    Component::new(Input::PriceVsMaLong, trend_curve(), 1.0),
                    Component::new(
                        Input::DaysBelowPbPercentile,
                        ScoreCurve::linear(&[(0.0, 0.0), (60.0, 100.0)]),
                        1.0,
                    ),
                ],
            },
        }
    }
}

impl DimensionScorer for Valuation {
    fn dimension(&self) -> Dimension {
        Dimension::Valuation
    }

    fn description(&self) -> &str {
        "P/E, P/B, price relative to moving averages and time spent in the low P/B zone"
    }

    fn frequency(&self) -> DataFrequency {
        DataFrequency::Daily
    }

    fn components(&self) -> &[Component] {
        &self.config.components
    }
}

impl ConfigurableScorer for Valuation {
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
    fn test_cheap_multiples_only() {
        let mut snap = fixtures::blank("A", "bank");
        snap.pe_ttm = Some(8.0);
        snap.pb_mrq = Some(0.9);
        assert_eq!(Valuation::default().score(&snap), Some(100.0));
    }

    #[test]
    fn test_loss_making_pe_scores_zero() {
        let mut snap = fixtures::blank("A", "bank");
        snap.pe_ttm = Some(-12.0);
        snap.pb_mrq = Some(3.0);
        // (2 * 0 + 2 * 40) / 4
        assert_eq!(Valuation::default().score(&snap), Some(20.0));
    }

    #[test]
    fn test_technical_components() {
        let mut snap = fixtures::blank("A", "bank");
        snap.close = 9.0;
        snap.technical.ma_short = Some(10.0);
        snap.technical.ma_long = Some(7.5);
        snap.technical.days_below_pb_percentile = Some(30);
        // close/MA60 = 0.9 -> 80, close/MA250 = 1.2 -> 20, 30 days -> 50
        assert_relative_eq!(
            Valuation::default().score(&snap).unwrap(),
            (80.0 + 20.0 + 50.0) / 3.0,
            epsilon = 1e-9
        );
    }
}
