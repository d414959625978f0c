//! Strategy screening.
//!
//! Each strategy is evaluated on its own against the scored universe:
//! filter, score, order, cap. A strategy whose record fails validation is
//! reported and skipped without affecting any other strategy.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::{
    composite::{CompositeScore, DimensionWeights},
    registry::ScoredSecurity,
    snapshot::SelectionRow,
    strategy::{FieldContext, StrategyConfig, StrategyRecord},
};

/// Strategies selected for a run.
#[derive(Debug, Default)]
pub struct PreparedStrategies {
    /// Valid strategies, by display order then code
    pub strategies: Vec<StrategyConfig>,
    /// Strategy code to failure reason
    pub failures: BTreeMap<String, String>,
}

/// Candidate lists of a run.
#[derive(Debug, Default)]
pub struct ScreenOutcome {
    /// Strategy code to ordered candidates
    pub selections: BTreeMap<String, Vec<SelectionRow>>,
    /// Strategy code to failure reason
    pub failures: BTreeMap<String, String>,
}

/// Evaluates strategies against a scored universe.
#[derive(Debug, Clone, Default)]
pub struct StrategyScreener {
    default_weights: DimensionWeights,
}

impl StrategyScreener {
    /// Create a screener; `default_weights` apply to strategies without a
    /// weight spec.
    pub const fn new(default_weights: DimensionWeights) -> Self {
        Self { default_weights }
    }

    /// Pick and validate the strategies to run.
    ///
    /// Without `requested`, every active record runs. With it, exactly the
    /// requested codes run; unknown or inactive codes are failures. When a
    /// code appears more than once, the highest version wins.
    pub fn prepare(&self, records: &[StrategyRecord], requested: Option<&[String]>) -> PreparedStrategies {
        let mut latest: BTreeMap<&str, &StrategyRecord> = BTreeMap::new();
        for record in records {
            match latest.get(record.code.as_str()) {
                Some(seen) if seen.version >= record.version => {}
                _ => {
                    latest.insert(record.code.as_str(), record);
                }
            }
        }

        let mut prepared = PreparedStrategies::default();
        let selected: Vec<&StrategyRecord> = match requested {
            None => latest.values().copied().filter(|r| r.active).collect(),
            Some(codes) => {
                let mut selected = Vec::new();
                for code in codes {
                    match latest.get(code.as_str()) {
                        Some(record) if record.active => selected.push(*record),
                        Some(_) => {
                            prepared.failures.insert(code.clone(), "strategy is inactive".to_string());
                        }
                        None => {
                            prepared.failures.insert(code.clone(), "unknown strategy".to_string());
                        }
                    }
                }
                selected
            }
        };

        for record in selected {
            match StrategyConfig::from_record(record) {
                Ok(config) => prepared.strategies.push(config),
                Err(err) => {
                    warn!(strategy = %record.code, error = %err, "strategy rejected");
                    prepared.failures.insert(record.code.clone(), err.to_string());
                }
            }
        }
        prepared.strategies.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.code.cmp(&b.code))
        });
        prepared.strategies.dedup_by(|a, b| a.code == b.code);
        prepared
    }

    /// Candidate list of one strategy.
    ///
    /// `composites` must be aligned with `securities`. Candidates are ordered
    /// by strategy score descending, nulls last, ties by code.
    pub fn screen(
        &self,
        strategy: &StrategyConfig,
        as_of: NaiveDate,
        securities: &[ScoredSecurity],
        composites: &[CompositeScore],
    ) -> Vec<SelectionRow> {
        let mut passed: Vec<(usize, Option<f64>)> = securities
            .iter()
            .zip(composites)
            .enumerate()
            .filter(|(_, (security, composite))| {
                strategy.filters.matches(&FieldContext { security, composite })
            })
            .map(|(idx, (security, composite))| {
                (idx, strategy.score(&self.default_weights, security, composite))
            })
            .collect();

        passed.sort_by(|(a, sa), (b, sb)| {
            let by_score = match (sa, sb) {
                (Some(x), Some(y)) => y.total_cmp(x),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            };
            by_score.then_with(|| securities[*a].snapshot.code.cmp(&securities[*b].snapshot.code))
        });
        if let Some(cap) = strategy.max_candidates {
            passed.truncate(cap);
        }

        passed
            .into_iter()
            .enumerate()
            .map(|(position, (idx, strategy_score))| {
                let security = &securities[idx];
                let composite = &composites[idx];
                SelectionRow {
                    run_date: as_of,
                    strategy_code: strategy.code.clone(),
                    strategy_version: strategy.version,
                    code: security.snapshot.code.clone(),
                    position: u32::try_from(position + 1).unwrap_or(u32::MAX),
                    strategy_score,
                    total_score: composite.total_score,
                    rating: composite.rating,
                    scores: security.scores,
                    filter_inputs: strategy
                        .filters
                        .inputs(&FieldContext { security, composite }),
                }
            })
            .collect()
    }

    /// Candidate lists of every prepared strategy.
    pub fn screen_all(
        &self,
        prepared: PreparedStrategies,
        as_of: NaiveDate,
        securities: &[ScoredSecurity],
        composites: &[CompositeScore],
    ) -> ScreenOutcome {
        let mut outcome = ScreenOutcome {
            selections: BTreeMap::new(),
            failures: prepared.failures,
        };
        for strategy in &prepared.strategies {
            let rows = self.screen(strategy, as_of, securities, composites);
            info!(
                strategy = %strategy.code,
                version = strategy.version,
                candidates = rows.len(),
                "strategy screened"
            );
            outcome.selections.insert(strategy.code.clone(), rows);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        composite::{CompositeAggregator, RatingScale},
        config::NormalizerConfig,
        dimensions::fixtures,
        normalize::Normalizer,
        registry::{Dimension, DimensionScores},
    };
    use serde_json::json;

    fn universe() -> (Vec<ScoredSecurity>, Vec<CompositeScore>) {
        let make = |code: &str, pb: f64, valuation: f64, dividend: Option<f64>| {
            let mut snapshot = fixtures::blank(code, "bank");
            snapshot.pb_mrq = Some(pb);
            let mut scores = DimensionScores::default();
            scores.set(Dimension::Valuation, Some(valuation));
            scores.set(Dimension::Dividend, dividend);
            ScoredSecurity { snapshot, scores }
        };
        let securities = vec![
            make("D", 0.7, 90.0, Some(40.0)),
            make("A", 0.9, 90.0, Some(40.0)),
            make("B", 1.3, 95.0, Some(100.0)),
            make("C", 0.5, 60.0, None),
        ];
        let normalized = Normalizer::default().normalize(&securities).unwrap();
        let composites = CompositeAggregator::new(
            DimensionWeights::default(),
            RatingScale::default(),
            &NormalizerConfig::default(),
        )
        .aggregate_all(&securities, &normalized.rows);
        (securities, composites)
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    #[test]
    fn test_filter_order_and_ties() {
        let (securities, composites) = universe();
        let record = StrategyRecord::new("low_pb", &json!({"pb_max": 1.0}));
        let config = StrategyConfig::from_record(&record).unwrap();

        let rows = StrategyScreener::default().screen(&config, as_of(), &securities, &composites);
        let codes: Vec<&str> = rows.iter().map(|r| r.code.as_str()).collect();
        // B fails pb_max; A and D tie on score and are ordered by code
        assert_eq!(codes, vec!["A", "D", "C"]);
        assert_eq!(rows[0].position, 1);
        assert_eq!(rows[0].filter_inputs["pb_max"], json!(0.9));
    }

    #[test]
    fn test_strategy_weights_and_cap() {
        let (securities, composites) = universe();
        let mut record = StrategyRecord::new("income", &json!({}));
        record.weights = r#"{"dividend": 1}"#.to_string();
        record.max_candidates = Some(2);
        let config = StrategyConfig::from_record(&record).unwrap();

        let rows = StrategyScreener::default().screen(&config, as_of(), &securities, &composites);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].code, "B");
        assert_eq!(rows[0].strategy_score, Some(100.0));
    }

    #[test]
    fn test_null_strategy_score_sorts_last() {
        let (securities, composites) = universe();
        let mut record = StrategyRecord::new("income", &json!({}));
        record.weights = r#"{"dividend": 1}"#.to_string();
        let config = StrategyConfig::from_record(&record).unwrap();

        let rows = StrategyScreener::default().screen(&config, as_of(), &securities, &composites);
        assert_eq!(rows.last().unwrap().code, "C");
        assert_eq!(rows.last().unwrap().strategy_score, None);
    }

    #[test]
    fn test_prepare_isolates_failures() {
        let good = StrategyRecord::new("good", &json!({"pb_max": 1.0}));
        let bad = StrategyRecord::new("bad", &json!({"alpha_max": 1.0}));
        let mut inactive = StrategyRecord::new("off", &json!({}));
        inactive.active = false;

        let screener = StrategyScreener::default();
        let prepared = screener.prepare(&[good.clone(), bad.clone(), inactive.clone()], None);
        assert_eq!(prepared.strategies.len(), 1);
        assert_eq!(prepared.strategies[0].code, "good");
        assert!(prepared.failures.contains_key("bad"));
        assert!(!prepared.failures.contains_key("off"));

        let requested = vec!["off".to_string(), "missing".to_string()];
        let prepared = screener.prepare(&[good, bad, inactive], Some(&requested));
        assert!(prepared.strategies.is_empty());
        assert_eq!(prepared.failures.len(), 2);
    }

    #[test]
    fn test_latest_version_wins() {
        let v1 = StrategyRecord::new("s", &json!({"pb_max": 1.0}));
        let mut v2 = StrategyRecord::new("s", &json!({"pb_max": 2.0}));
        v2.version = 2;

        let prepared = StrategyScreener::default().prepare(&[v2, v1], None);
        assert_eq!(prepared.strategies.len(), 1);
        assert_eq!(prepared.strategies[0].version, 2);
    }
}
