use chrono::{Datelike, Days, NaiveDate, Weekday};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use fd_scoring::{
    EngineConfig, MemoryStore, RunContext, ScoringEngine,
    model::{DailyBar, FiscalPeriod, Metric, RawFactorObservation, Security},
    source::FactorSource,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

const INDUSTRIES: [&str; 8] = [
    "bank", "insurance", "utilities", "energy", "materials", "industrials", "consumer", "tech",
];

fn trading_days(end: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut day = end;
    while days.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(day);
        }
        day = day - Days::new(1);
    }
    days.reverse();
    days
}

fn universe(size: usize, as_of: NaiveDate) -> MemoryStore {
    let mut rng = StdRng::seed_from_u64(7);
    let store = MemoryStore::new();
    let days = trading_days(as_of, 260);
    let listed = NaiveDate::from_ymd_opt(2010, 1, 4).unwrap();

    let mut securities = Vec::with_capacity(size);
    let mut bars = Vec::with_capacity(size * days.len());
    let mut observations = Vec::new();
    for i in 0..size {
        let code = format!("sh.{:06}", 600_000 + i);
        let industry = INDUSTRIES[i % INDUSTRIES.len()];
        securities.push(
            Security::new(&code, &code, Some(industry), listed)
                .with_shares(rng.gen_range(1e8..1e10), rng.gen_range(1e8..1e9)),
        );

        let mut close: f64 = rng.gen_range(3.0..80.0);
        let pb_base: f64 = rng.gen_range(0.5..5.0);
        for day in &days {
            close *= 1.0 + rng.gen_range(-0.03..0.03);
            let pb = pb_base * rng.gen_range(0.9..1.1);
            bars.push(
                DailyBar::new(&code, *day, close)
                    .with_valuation(rng.gen_range(-5.0..60.0), pb)
                    .with_amount(rng.gen_range(1e6..1e9)),
            );
        }

        for metric in Metric::ALL {
            observations.push(RawFactorObservation {
                code: code.clone(),
                period: FiscalPeriod::new(2024, 1),
                metric,
                value: rng.gen_range(-0.2..0.5),
                published: NaiveDate::from_ymd_opt(2024, 4, 25),
            });
        }
    }

    store.add_securities(securities).unwrap();
    store.add_bars(bars).unwrap();
    store.add_observations(observations).unwrap();
    store
}

fn bench_score_universe(c: &mut Criterion) {
    let as_of = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
    let mut group = c.benchmark_group("score_universe");
    group.sample_size(10);

    for size in [100, 500] {
        let store = universe(size, as_of);
        for parallel in [false, true] {
            let engine = ScoringEngine::new(EngineConfig {
                parallel,
                ..EngineConfig::default()
            })
            .unwrap();
            let raw = store
                .load_universe(as_of, &engine.load_window(as_of))
                .unwrap();
            let ctx = RunContext::new(as_of);
            let label = if parallel { "parallel" } else { "sequential" };

            group.bench_with_input(BenchmarkId::new(label, size), &raw, |b, raw| {
                b.iter(|| black_box(engine.score_universe(&ctx, raw).unwrap()));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_score_universe);
criterion_main!(benches);
