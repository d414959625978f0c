//! Point-in-time factor loading.
//!
//! Turns a [`RawUniverse`] read for date D into one [`FactorSnapshot`] per
//! security, using only facts that were public on D:
//!
//! - fundamentals come from the latest fiscal period, per statement, whose
//!   effective publication date is on or before D (restatements resolved to
//!   the latest one published by D)
//! - the daily bar must exist for D and be tradable, otherwise the security
//!   is skipped with [`ScoringError::MissingData`]
//! - technical indicators and dividend figures only look backwards from D

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Days, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    Result, ScoringError,
    config::{LoaderConfig, TechnicalConfig},
    model::{
        DailyBar, DividendEvent, FiscalPeriod, Metric, RawFactorObservation, RawUniverse,
        Security, Statement, UNCLASSIFIED_INDUSTRY,
    },
    source::LoadWindow,
    technical::{TechnicalFactors, compute_technicals},
};

/// Which fiscal period a statement's values were taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementSource {
    /// Statement family
    pub statement: Statement,
    /// Fiscal period used
    pub period: FiscalPeriod,
    /// Effective publication date of the period
    pub published: NaiveDate,
}

/// Dividend figures derived as of D.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DividendFactors {
    /// Trailing cash dividend per share over the dividend window
    pub cash_ttm: Option<f64>,
    /// Trailing cash dividend over close, percent
    pub yield_ttm: Option<f64>,
    /// Distinct recent years with a positive cash dividend
    pub dividend_years: u32,
    /// Consecutive fiscal years, ending at the latest annual report, that
    /// were both profitable and paid a cash dividend
    pub profit_dividend_years: u32,
}

/// Everything known about one security on the as-of date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorSnapshot {
    /// Security code
    pub code: String,
    /// Display name
    pub name: String,
    /// As-of date
    pub as_of: NaiveDate,
    /// Industry in force on the as-of date
    pub industry: String,
    /// Calendar days since listing
    pub listed_days: i64,
    /// Special-treatment flag on the as-of date
    pub is_st: bool,
    /// Close on the as-of date
    pub close: f64,
    /// Traded amount on the as-of date
    pub amount: Option<f64>,
    /// Turnover rate on the as-of date
    pub turnover: Option<f64>,
    /// Trailing P/E
    pub pe_ttm: Option<f64>,
    /// Most-recent-quarter P/B
    pub pb_mrq: Option<f64>,
    /// Trailing P/S
    pub ps_ttm: Option<f64>,
    /// Close times total shares
    pub market_cap: Option<f64>,
    /// Latest known value of each fundamental metric
    pub fundamentals: BTreeMap<Metric, f64>,
    /// Fiscal period behind each statement present
    pub sources: Vec<StatementSource>,
    /// Statements with no period published by the as-of date
    pub missing: Vec<Statement>,
    /// Technical indicators
    pub technical: TechnicalFactors,
    /// Dividend figures
    pub dividend: DividendFactors,
}

impl FactorSnapshot {
    /// Latest known value of a fundamental metric.
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        self.fundamentals.get(&metric).copied()
    }

    /// Close relative to a moving average.
    pub fn price_vs(&self, average: Option<f64>) -> Option<f64> {
        average.filter(|ma| *ma > 0.0).map(|ma| self.close / ma)
    }

    /// Whether at least one statement had no published period.
    pub fn is_partial(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// Result of loading one as-of date.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// Loaded securities, ordered by code
    pub snapshots: Vec<FactorSnapshot>,
    /// Securities skipped for lack of a tradable daily bar
    pub skipped: Vec<ScoringError>,
}

impl LoadOutcome {
    /// Number of snapshots with at least one missing statement.
    pub fn partial(&self) -> usize {
        self.snapshots.iter().filter(|s| s.is_partial()).count()
    }
}

/// Builds [`FactorSnapshot`]s from raw point-in-time facts.
#[derive(Debug, Clone, Default)]
pub struct FactorLoader {
    config: LoaderConfig,
    technical: TechnicalConfig,
}

impl FactorLoader {
    /// Create a loader.
    pub const fn new(config: LoaderConfig, technical: TechnicalConfig) -> Self {
        Self { config, technical }
    }

    /// Date window the raw store has to cover for `as_of`.
    pub fn window(&self, as_of: NaiveDate) -> LoadWindow {
        let history = self
            .config
            .lookback_days
            .max(self.config.dividend_window_days);
        let start = as_of
            .checked_sub_days(Days::new(u64::from(history)))
            .unwrap_or(NaiveDate::MIN);
        LoadWindow { start, end: as_of }
    }

    /// Load every security of the as-of universe.
    pub fn load(&self, raw: &RawUniverse, parallel: bool) -> Result<LoadOutcome> {
        let as_of = raw.as_of;
        let mut universe: Vec<&Security> =
            raw.securities.iter().filter(|s| s.in_universe(as_of)).collect();
        universe.sort_by(|a, b| a.code.cmp(&b.code));

        let window = self.window(as_of);
        let history: Vec<&DailyBar> = raw
            .bars
            .iter()
            .filter(|b| b.tradable && b.trade_date >= window.start && b.trade_date <= as_of)
            .collect();
        let technicals = compute_technicals(&history, as_of, &self.technical)?;

        let mut today: HashMap<&str, &DailyBar> = HashMap::new();
        for bar in raw.bars.iter().filter(|b| b.trade_date == as_of) {
            today.insert(bar.code.as_str(), bar);
        }
        let mut observations: HashMap<&str, Vec<&RawFactorObservation>> = HashMap::new();
        for obs in raw
            .observations
            .iter()
            .filter(|o| o.known_on(as_of, &self.config.publication_lag))
        {
            observations.entry(obs.code.as_str()).or_default().push(obs);
        }
        let mut dividends: HashMap<&str, Vec<&DividendEvent>> = HashMap::new();
        for event in &raw.dividends {
            dividends.entry(event.code.as_str()).or_default().push(event);
        }

        let load_one = |security: &&Security| -> std::result::Result<FactorSnapshot, ScoringError> {
            let code = security.code.as_str();
            let bar = today
                .get(code)
                .filter(|b| b.tradable)
                .ok_or_else(|| ScoringError::missing(code, as_of, "daily_bar"))?;
            let obs = observations.get(code).map_or(&[][..], Vec::as_slice);
            let divs = dividends.get(code).map_or(&[][..], Vec::as_slice);
            Ok(self.snapshot(
                security,
                bar,
                obs,
                divs,
                technicals.get(code).copied().unwrap_or_default(),
                as_of,
            ))
        };

        let results: Vec<std::result::Result<FactorSnapshot, ScoringError>> = if parallel {
            universe.par_iter().map(load_one).collect()
        } else {
            universe.iter().map(load_one).collect()
        };

        let mut outcome = LoadOutcome::default();
        for result in results {
            match result {
                Ok(snapshot) => {
                    for statement in &snapshot.missing {
                        debug!(code = %snapshot.code, date = %as_of, statement = statement.as_str(), "no published period");
                    }
                    outcome.snapshots.push(snapshot);
                }
                Err(err) => {
                    warn!(date = %as_of, error = %err, "security skipped");
                    outcome.skipped.push(err);
                }
            }
        }

        info!(
            date = %as_of,
            universe = universe.len(),
            loaded = outcome.snapshots.len(),
            partial = outcome.partial(),
            skipped = outcome.skipped.len(),
            "factors loaded"
        );
        Ok(outcome)
    }

    fn snapshot(
        &self,
        security: &Security,
        bar: &DailyBar,
        observations: &[&RawFactorObservation],
        dividends: &[&DividendEvent],
        technical: TechnicalFactors,
        as_of: NaiveDate,
    ) -> FactorSnapshot {
        let (fundamentals, sources, missing) = self.fundamentals(observations);
        let market_cap = security
            .total_shares
            .filter(|s| *s > 0.0)
            .map(|shares| bar.close * shares);
        let dividend = self.dividends(bar.close, observations, dividends, as_of);

        FactorSnapshot {
            code: security.code.clone(),
            name: security.name.clone(),
            as_of,
            industry: security
                .industry_as_of(as_of)
                .unwrap_or(UNCLASSIFIED_INDUSTRY)
                .to_string(),
            listed_days: security.listed_days(as_of),
            is_st: bar.is_st,
            close: bar.close,
            amount: bar.amount,
            turnover: bar.turnover,
            pe_ttm: bar.pe_ttm,
            pb_mrq: bar.pb_mrq,
            ps_ttm: bar.ps_ttm,
            market_cap,
            fundamentals,
            sources,
            missing,
            technical,
            dividend,
        }
    }

    /// Latest known period per statement, and the latest published value of
    /// each metric for that period.
    #[allow(clippy::type_complexity)]
    fn fundamentals(
        &self,
        observations: &[&RawFactorObservation],
    ) -> (BTreeMap<Metric, f64>, Vec<StatementSource>, Vec<Statement>) {
        let lag = &self.config.publication_lag;
        let mut values = BTreeMap::new();
        let mut sources = Vec::new();
        let mut missing = Vec::new();

        for statement in Statement::ALL {
            let in_statement = || {
                observations
                    .iter()
                    .filter(move |o| o.metric.statement() == statement && o.value.is_finite())
            };
            let Some(period) = in_statement().map(|o| o.period).max() else {
                missing.push(statement);
                continue;
            };

            let mut published = NaiveDate::MIN;
            let mut latest: BTreeMap<Metric, (NaiveDate, f64)> = BTreeMap::new();
            for obs in in_statement().filter(|o| o.period == period) {
                let effective = obs.effective_date(lag).unwrap_or(NaiveDate::MIN);
                published = published.max(effective);
                match latest.get(&obs.metric) {
                    Some((seen, _)) if *seen > effective => {}
                    _ => {
                        latest.insert(obs.metric, (effective, obs.value));
                    }
                }
            }
            values.extend(latest.into_iter().map(|(m, (_, v))| (m, v)));
            sources.push(StatementSource {
                statement,
                period,
                published,
            });
        }

        (values, sources, missing)
    }

    fn dividends(
        &self,
        close: f64,
        observations: &[&RawFactorObservation],
        dividends: &[&DividendEvent],
        as_of: NaiveDate,
    ) -> DividendFactors {
        let window_start = as_of
            .checked_sub_days(Days::new(u64::from(self.config.dividend_window_days)))
            .unwrap_or(NaiveDate::MIN);
        let paid: Vec<(&DividendEvent, NaiveDate, f64)> = dividends
            .iter()
            .filter_map(|e| Some((*e, e.effective_date()?, e.cash()?)))
            .filter(|(_, effective, _)| *effective <= as_of)
            .collect();

        let cash_ttm: f64 = paid
            .iter()
            .filter(|(_, effective, _)| *effective > window_start)
            .map(|(_, _, cash)| cash)
            .sum();
        let cash_ttm = (cash_ttm > 0.0).then_some(cash_ttm);
        let yield_ttm = cash_ttm
            .filter(|_| close > 0.0)
            .map(|cash| cash / close * 100.0);

        let span = i32::try_from(self.config.dividend_years_span).unwrap_or(i32::MAX);
        let first_year = as_of.year().saturating_sub(span - 1);
        let mut years: Vec<i32> = paid
            .iter()
            .map(|(e, _, _)| e.year)
            .filter(|y| *y >= first_year)
            .collect();
        years.sort_unstable();
        years.dedup();

        DividendFactors {
            cash_ttm,
            yield_ttm,
            dividend_years: u32::try_from(years.len()).unwrap_or(u32::MAX),
            profit_dividend_years: self.profit_dividend_years(observations, &paid),
        }
    }

    fn profit_dividend_years(
        &self,
        observations: &[&RawFactorObservation],
        paid: &[(&DividendEvent, NaiveDate, f64)],
    ) -> u32 {
        let lag = &self.config.publication_lag;
        let mut annual: BTreeMap<i32, (NaiveDate, f64)> = BTreeMap::new();
        for obs in observations
            .iter()
            .filter(|o| o.metric == Metric::NetProfit && o.period.is_annual())
        {
            let effective = obs.effective_date(lag).unwrap_or(NaiveDate::MIN);
            match annual.get(&obs.period.year) {
                Some((seen, _)) if *seen > effective => {}
                _ => {
                    annual.insert(obs.period.year, (effective, obs.value));
                }
            }
        }

        let Some(&latest) = annual.keys().next_back() else {
            return 0;
        };
        let mut streak = 0;
        let mut year = latest;
        while annual.get(&year).is_some_and(|(_, profit)| *profit > 0.0)
            && paid.iter().any(|(e, _, _)| e.year == year)
        {
            streak += 1;
            year -= 1;
        }
        streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn obs(
        period: FiscalPeriod,
        metric: Metric,
        value: f64,
        published: NaiveDate,
    ) -> RawFactorObservation {
        RawFactorObservation {
            code: "sh.600000".to_string(),
            period,
            metric,
            value,
            published: Some(published),
        }
    }

    fn dividend(year: i32, cash: f64, pay: NaiveDate) -> DividendEvent {
        DividendEvent {
            code: "sh.600000".to_string(),
            year,
            cash_per_share: Some(cash),
            plan_date: None,
            operate_date: None,
            pay_date: Some(pay),
        }
    }

    fn universe(as_of: NaiveDate) -> RawUniverse {
        RawUniverse {
            as_of,
            securities: vec![
                Security::new("sh.600000", "Bank", Some("bank"), date(2000, 1, 4))
                    .with_shares(1e9, 8e8),
            ],
            observations: vec![],
            bars: vec![DailyBar::new("sh.600000", as_of, 10.0).with_valuation(8.0, 0.9)],
            dividends: vec![],
        }
    }

    #[test]
    fn test_future_publication_is_invisible() {
        let as_of = date(2024, 4, 20);
        let mut raw = universe(as_of);
        raw.observations = vec![
            obs(FiscalPeriod::new(2023, 3), Metric::Roe, 0.10, date(2023, 10, 28)),
            obs(FiscalPeriod::new(2023, 4), Metric::Roe, 0.18, date(2024, 4, 25)),
        ];

        let outcome = FactorLoader::default().load(&raw, false).unwrap();
        let snap = &outcome.snapshots[0];
        assert_eq!(snap.metric(Metric::Roe), Some(0.10));
        assert_eq!(snap.sources[0].period, FiscalPeriod::new(2023, 3));
    }

    #[test]
    fn test_restatement_uses_latest_published_by_as_of() {
        let as_of = date(2024, 6, 1);
        let mut raw = universe(as_of);
        let period = FiscalPeriod::new(2024, 1);
        raw.observations = vec![
            obs(period, Metric::Roe, 0.05, date(2024, 4, 28)),
            obs(period, Metric::Roe, 0.04, date(2024, 5, 20)),
            obs(period, Metric::Roe, 0.03, date(2024, 6, 2)),
        ];

        let outcome = FactorLoader::default().load(&raw, false).unwrap();
        assert_eq!(outcome.snapshots[0].metric(Metric::Roe), Some(0.04));
    }

    #[test]
    fn test_missing_daily_bar_skips_security() {
        let as_of = date(2024, 6, 3);
        let mut raw = universe(as_of);
        raw.bars[0].tradable = false;

        let outcome = FactorLoader::default().load(&raw, false).unwrap();
        assert!(outcome.snapshots.is_empty());
        assert!(matches!(
            &outcome.skipped[0],
            ScoringError::MissingData { field, .. } if field == "daily_bar"
        ));
    }

    #[test]
    fn test_missing_fundamentals_keep_security() {
        let as_of = date(2024, 6, 3);
        let outcome = FactorLoader::default().load(&universe(as_of), false).unwrap();
        let snap = &outcome.snapshots[0];

        assert_eq!(snap.missing, Statement::ALL.to_vec());
        assert!(snap.fundamentals.is_empty());
        assert_eq!(snap.pe_ttm, Some(8.0));
        assert_relative_eq!(snap.market_cap.unwrap(), 1e10);
        assert_eq!(outcome.partial(), 1);
    }

    #[test]
    fn test_dividend_figures() {
        let as_of = date(2024, 6, 3);
        let mut raw = universe(as_of);
        raw.dividends = vec![
            dividend(2021, 0.2, date(2022, 7, 1)),
            dividend(2022, 0.3, date(2023, 7, 1)),
            dividend(2023, 0.4, date(2024, 5, 10)),
            // Announced but not yet paid on the as-of date
            dividend(2024, 0.5, date(2024, 6, 10)),
        ];
        raw.observations = vec![
            obs(FiscalPeriod::new(2022, 4), Metric::NetProfit, 1e8, date(2023, 4, 20)),
            obs(FiscalPeriod::new(2023, 4), Metric::NetProfit, 2e8, date(2024, 4, 20)),
            obs(FiscalPeriod::new(2021, 4), Metric::NetProfit, -1e7, date(2022, 4, 20)),
        ];

        let outcome = FactorLoader::default().load(&raw, false).unwrap();
        let div = outcome.snapshots[0].dividend;

        assert_relative_eq!(div.cash_ttm.unwrap(), 0.7, epsilon = 1e-12);
        assert_relative_eq!(div.yield_ttm.unwrap(), 7.0, epsilon = 1e-9);
        // 2022 and 2023 fall within the three-year span ending 2024
        assert_eq!(div.dividend_years, 2);
        // 2023 and 2022 profitable with dividends; 2021 was a loss
        assert_eq!(div.profit_dividend_years, 2);
    }

    #[test]
    fn test_unclassified_industry_label() {
        let as_of = date(2024, 6, 3);
        let mut raw = universe(as_of);
        raw.securities[0] = Security::new("sh.600000", "Bank", None, date(2000, 1, 4));

        let outcome = FactorLoader::default().load(&raw, false).unwrap();
        assert_eq!(outcome.snapshots[0].industry, UNCLASSIFIED_INDUSTRY);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let as_of = date(2024, 6, 3);
        let raw = universe(as_of);
        let loader = FactorLoader::default();
        assert_eq!(
            loader.load(&raw, true).unwrap().snapshots,
            loader.load(&raw, false).unwrap().snapshots
        );
    }
}
