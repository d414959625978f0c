//! End-to-end runs over an in-memory store.

use approx::assert_relative_eq;
use chrono::NaiveDate;
use fd_scoring::{
    Dimension, DimensionWeights, EngineConfig, MemoryStore, PeerField, Rating, RunContext,
    ScoringEngine, ScoringError, StrategyRecord,
    model::{DailyBar, FiscalPeriod, Metric, RawFactorObservation, Security},
    snapshot::ScoreRow,
};
use serde_json::json;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn d1() -> NaiveDate {
    date(2024, 5, 31)
}

fn d2() -> NaiveDate {
    date(2024, 6, 3)
}

fn observation(code: &str, metric: Metric, value: f64, published: NaiveDate) -> RawFactorObservation {
    RawFactorObservation {
        code: code.to_string(),
        period: FiscalPeriod::new(2024, 1),
        metric,
        value,
        published: Some(published),
    }
}

/// Five banks with P/E 8..25 (median 15), one tech name with full data and
/// one with no fundamentals at all.
fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    let listed = date(2015, 1, 5);
    let banks = [
        ("sh.600000", 8.0, 0.9, 0.18),
        ("sh.600016", 12.0, 1.2, 0.12),
        ("sh.600036", 15.0, 1.5, 0.16),
        ("sh.601166", 18.0, 0.8, 0.09),
        ("sh.601398", 25.0, 2.5, 0.06),
    ];

    let mut securities = Vec::new();
    let mut bars = Vec::new();
    let mut observations = Vec::new();
    for (code, pe, pb, roe) in banks {
        securities.push(Security::new(code, code, Some("bank"), listed));
        for day in [d1(), d2()] {
            bars.push(DailyBar::new(code, day, 10.0).with_valuation(pe, pb));
        }
        observations.push(observation(code, Metric::Roe, roe, date(2024, 4, 28)));
    }

    securities.push(Security::new("sz.000001", "full", Some("tech"), listed));
    securities.push(Security::new("sz.000002", "bare", Some("tech"), listed));
    for day in [d1(), d2()] {
        bars.push(DailyBar::new("sz.000001", day, 30.0).with_valuation(30.0, 4.5));
        bars.push(DailyBar::new("sz.000002", day, 5.0).with_valuation(9.0, 0.7));
    }
    observations.push(observation("sz.000001", Metric::Roe, 0.22, date(2024, 4, 20)));
    observations.push(observation("sz.000001", Metric::RevenueYoy, 0.35, date(2024, 4, 20)));
    observations.push(observation("sz.000001", Metric::DebtToAssets, 0.30, date(2024, 4, 20)));

    // Suspended on D2: skipped that day only
    securities.push(Security::new("sz.000003", "halted", Some("tech"), listed));
    bars.push(DailyBar::new("sz.000003", d1(), 8.0).with_valuation(10.0, 1.0));
    let mut halted = DailyBar::new("sz.000003", d2(), 8.0);
    halted.tradable = false;
    bars.push(halted);

    store.add_securities(securities).unwrap();
    store.add_bars(bars).unwrap();
    store.add_observations(observations).unwrap();

    store
        .put_strategy(StrategyRecord::new(
            "low_pb",
            &json!({"pb_max": 1.0, "is_st": false}),
        ))
        .unwrap();
    store
        .put_strategy(StrategyRecord::new("quality", &json!({"roe_min": 15.0})))
        .unwrap();
    store
}

fn engine() -> ScoringEngine {
    ScoringEngine::new(EngineConfig::default()).unwrap()
}

fn row<'a>(rows: &'a [ScoreRow], code: &str) -> &'a ScoreRow {
    rows.iter().find(|r| r.code == code).unwrap()
}

#[test]
fn test_run_reports_counts() {
    let store = seeded_store();
    let report = engine()
        .compute(&RunContext::new(d2()), &store, &store, &store)
        .unwrap();

    assert_eq!(report.scored, 7);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.partial, 7);
    assert!(report.failed_strategies.is_empty());
    assert_eq!(report.strategies.len(), 2);

    let log = store.run_log().unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].success);
    assert_eq!(log[0].scored, 7);
}

#[test]
fn test_scenario_a_value_bank() {
    let store = seeded_store();
    engine()
        .compute(&RunContext::new(d2()), &store, &store, &store)
        .unwrap();
    let rows = store.scores(d2()).unwrap();
    let a = row(&rows, "sh.600000");

    // P/E 8 against an industry median of 15 ranks first of five
    let pe = a.normalized.get(PeerField::PeTtm);
    assert_eq!(pe.rank, Some(1));
    assert_eq!(pe.peers, 5);
    assert_eq!(pe.percentile, Some(100.0));
    let median = row(&rows, "sh.600036").normalized.get(PeerField::PeTtm);
    assert!(pe.rank < median.rank);

    // ROE 18% -> 80; P/E 8 and P/B 0.9 -> 100
    assert_eq!(a.scores.get(Dimension::Profitability), Some(80.0));
    assert_eq!(a.scores.get(Dimension::Valuation), Some(100.0));

    // Only profitability and valuation are present, at 0.20 each
    let total = a.composite.total_score.unwrap();
    assert_relative_eq!(total, 90.0, epsilon = 1e-9);
    assert_eq!(a.composite.rating, Some(Rating::A));
    assert_eq!(
        a.composite.total_score,
        DimensionWeights::default().combine(&a.scores)
    );
}

#[test]
fn test_scenario_b_pb_filter_ignores_rating() {
    let store = seeded_store();
    engine()
        .compute(&RunContext::new(d2()), &store, &store, &store)
        .unwrap();
    let rows = store.scores(d2()).unwrap();
    let selected = store.selections(d2(), "low_pb").unwrap();

    let codes: Vec<&str> = selected.iter().map(|s| s.code.as_str()).collect();
    assert!(codes.contains(&"sh.600000"));
    assert!(codes.contains(&"sh.601166"));
    assert!(codes.contains(&"sz.000002"));
    // Rated, but P/B 4.5
    assert!(!codes.contains(&"sz.000001"));
    assert!(row(&rows, "sz.000001").composite.rating.is_some());

    for candidate in &selected {
        assert!(candidate.filter_inputs["pb_max"].as_f64().unwrap() <= 1.0);
    }
    let positions: Vec<u32> = selected.iter().map(|s| s.position).collect();
    assert_eq!(positions, (1..=selected.len() as u32).collect::<Vec<_>>());
    for pair in selected.windows(2) {
        assert!(pair[0].strategy_score >= pair[1].strategy_score);
    }
}

#[test]
fn test_scenario_c_no_fundamentals() {
    let store = seeded_store();
    engine()
        .compute(&RunContext::new(d2()), &store, &store, &store)
        .unwrap();
    let rows = store.scores(d2()).unwrap();
    let bare = row(&rows, "sz.000002");

    for dimension in [
        Dimension::Profitability,
        Dimension::Operation,
        Dimension::Growth,
        Dimension::Solvency,
        Dimension::CashFlow,
    ] {
        assert_eq!(bare.scores.get(dimension), None, "{dimension}");
    }
    let valuation = bare.scores.get(Dimension::Valuation).unwrap();
    assert_relative_eq!(bare.composite.total_score.unwrap(), valuation, epsilon = 1e-9);
    assert!(bare.sources.is_empty());
}

#[test]
fn test_scenario_d_correction_only_touches_its_date() {
    let store = seeded_store();
    let engine = engine();
    engine
        .compute(&RunContext::new(d1()), &store, &store, &store)
        .unwrap();
    engine
        .compute(&RunContext::new(d2()), &store, &store, &store)
        .unwrap();
    let before_d1 = store.scores(d1()).unwrap();
    let before_d2 = store.scores(d2()).unwrap();

    // Corrected multiples for D2
    store
        .add_bars([DailyBar::new("sh.601398", d2(), 10.0).with_valuation(6.0, 0.6)])
        .unwrap();
    engine
        .compute(&RunContext::new(d2()), &store, &store, &store)
        .unwrap();

    assert_eq!(store.scores(d1()).unwrap(), before_d1);
    let after_d2 = store.scores(d2()).unwrap();
    assert_ne!(after_d2, before_d2);
    assert_eq!(
        row(&after_d2, "sh.601398").normalized.get(PeerField::PeTtm).rank,
        Some(1)
    );
}

#[test]
fn test_rerun_is_idempotent() {
    let store = seeded_store();
    let engine = engine();
    engine
        .compute(&RunContext::new(d2()), &store, &store, &store)
        .unwrap();
    let scores = store.scores(d2()).unwrap();
    let selections = store.selections(d2(), "low_pb").unwrap();

    engine
        .compute(&RunContext::new(d2()), &store, &store, &store)
        .unwrap();
    assert_eq!(store.scores(d2()).unwrap(), scores);
    assert_eq!(store.selections(d2(), "low_pb").unwrap(), selections);
    assert_eq!(store.run_log().unwrap().len(), 2);
}

#[test]
fn test_parallel_and_sequential_runs_match() {
    let parallel = seeded_store();
    let sequential = seeded_store();
    engine()
        .compute(&RunContext::new(d2()), &parallel, &parallel, &parallel)
        .unwrap();
    let config = EngineConfig {
        parallel: false,
        ..EngineConfig::default()
    };
    ScoringEngine::new(config)
        .unwrap()
        .compute(&RunContext::new(d2()), &sequential, &sequential, &sequential)
        .unwrap();

    assert_eq!(parallel.scores(d2()).unwrap(), sequential.scores(d2()).unwrap());
    assert_eq!(
        parallel.selections(d2(), "quality").unwrap(),
        sequential.selections(d2(), "quality").unwrap()
    );
}

#[test]
fn test_later_publications_do_not_leak() {
    let store = seeded_store();
    let engine = engine();
    engine
        .compute(&RunContext::new(d2()), &store, &store, &store)
        .unwrap();
    let before = store.scores(d2()).unwrap();

    // A restatement and a new statement, both published after D2
    store
        .add_observations([
            observation("sh.600000", Metric::Roe, 0.01, date(2024, 6, 10)),
            observation("sz.000002", Metric::DebtToAssets, 0.95, date(2024, 7, 1)),
        ])
        .unwrap();
    engine
        .compute(&RunContext::new(d2()), &store, &store, &store)
        .unwrap();
    assert_eq!(store.scores(d2()).unwrap(), before);
}

#[test]
fn test_persistence_failure_commits_nothing() {
    let store = seeded_store();
    store.fail_commits(true);
    let err = engine()
        .compute(&RunContext::new(d2()), &store, &store, &store)
        .unwrap_err();
    assert!(matches!(err, ScoringError::Persistence(_)));
    assert!(err.is_fatal());
    assert!(store.scores(d2()).unwrap().is_empty());
    assert!(store.run_log().unwrap().is_empty());

    store.fail_commits(false);
    engine()
        .compute(&RunContext::new(d2()), &store, &store, &store)
        .unwrap();
    assert_eq!(store.scores(d2()).unwrap().len(), 7);
}

#[test]
fn test_bad_strategy_keeps_previous_snapshot() {
    let store = seeded_store();
    let engine = engine();
    engine
        .compute(&RunContext::new(d2()), &store, &store, &store)
        .unwrap();
    let quality = store.selections(d2(), "quality").unwrap();
    assert!(!quality.is_empty());

    store
        .put_strategy(StrategyRecord::new("quality", &json!({"roe_min": "high"})))
        .unwrap();
    let report = engine
        .compute(&RunContext::new(d2()), &store, &store, &store)
        .unwrap();

    assert!(report.failed_strategies.contains_key("quality"));
    assert!(report.strategies.contains_key("low_pb"));
    assert_eq!(store.selections(d2(), "quality").unwrap(), quality);
    let log = store.run_log().unwrap();
    assert!(log[1].failed_strategies.contains_key("quality"));
}

#[test]
fn test_requested_strategies_only() {
    let store = seeded_store();
    let ctx = RunContext::new(d2()).with_strategies(["quality"]);
    let report = engine().compute(&ctx, &store, &store, &store).unwrap();

    assert_eq!(report.strategies.keys().collect::<Vec<_>>(), vec!["quality"]);
    assert!(store.selections(d2(), "low_pb").unwrap().is_empty());
    for candidate in store.selections(d2(), "quality").unwrap() {
        assert!(candidate.filter_inputs["roe_min"].as_f64().unwrap() >= 15.0);
    }
}

#[test]
fn test_cancelled_run_commits_nothing() {
    let store = seeded_store();
    let ctx = RunContext::new(d2());
    ctx.cancel();
    let err = engine().compute(&ctx, &store, &store, &store).unwrap_err();
    assert!(matches!(err, ScoringError::Cancelled { .. }));
    assert!(store.scores(d2()).unwrap().is_empty());
}

#[test]
fn test_industry_ranks_are_bounded() {
    let store = seeded_store();
    engine()
        .compute(&RunContext::new(d2()), &store, &store, &store)
        .unwrap();
    let rows = store.scores(d2()).unwrap();

    for field in PeerField::ALL {
        for industry in ["bank", "tech"] {
            let mut ranks: Vec<u32> = rows
                .iter()
                .filter(|r| r.industry == industry)
                .filter_map(|r| r.normalized.get(field).rank)
                .collect();
            ranks.sort_unstable();
            let expected: Vec<u32> = (1..=ranks.len() as u32).collect();
            assert_eq!(ranks, expected, "{field} in {industry}");
        }
    }
}
