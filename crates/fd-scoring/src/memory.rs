//! In-memory store.
//!
//! Implements every store interface over plain collections. Used by tests,
//! benches and dry runs; the SQLite adapter is the durable counterpart.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::NaiveDate;

use crate::{
    Result, ScoringError,
    model::{DailyBar, DividendEvent, RawFactorObservation, RawUniverse, Security},
    snapshot::{RunLogEntry, ScoreRow, SelectionRow, SnapshotBatch, SnapshotSink},
    source::{FactorSource, LoadWindow, StrategySource},
    strategy::StrategyRecord,
};

#[derive(Debug, Default)]
struct Raw {
    securities: Vec<Security>,
    observations: Vec<RawFactorObservation>,
    bars: Vec<DailyBar>,
    dividends: Vec<DividendEvent>,
}

#[derive(Debug, Default)]
struct Snapshots {
    scores: BTreeMap<NaiveDate, Vec<ScoreRow>>,
    selections: BTreeMap<(NaiveDate, String), Vec<SelectionRow>>,
    log: Vec<RunLogEntry>,
}

/// A store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    raw: RwLock<Raw>,
    strategies: RwLock<Vec<StrategyRecord>>,
    snapshots: RwLock<Snapshots>,
    fail_commits: AtomicBool,
}

fn poisoned<T>(_: T) -> ScoringError {
    ScoringError::Persistence("memory store lock poisoned".to_string())
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add reference data.
    pub fn add_securities(&self, securities: impl IntoIterator<Item = Security>) -> Result<()> {
        self.raw.write().map_err(poisoned)?.securities.extend(securities);
        Ok(())
    }

    /// Add fundamentals.
    pub fn add_observations(
        &self,
        observations: impl IntoIterator<Item = RawFactorObservation>,
    ) -> Result<()> {
        self.raw.write().map_err(poisoned)?.observations.extend(observations);
        Ok(())
    }

    /// Add daily bars, replacing any bar with the same code and date.
    pub fn add_bars(&self, bars: impl IntoIterator<Item = DailyBar>) -> Result<()> {
        let mut raw = self.raw.write().map_err(poisoned)?;
        for bar in bars {
            raw.bars
                .retain(|b| !(b.code == bar.code && b.trade_date == bar.trade_date));
            raw.bars.push(bar);
        }
        Ok(())
    }

    /// Add dividend events.
    pub fn add_dividends(&self, events: impl IntoIterator<Item = DividendEvent>) -> Result<()> {
        self.raw.write().map_err(poisoned)?.dividends.extend(events);
        Ok(())
    }

    /// Insert or replace a strategy record by (code, version).
    pub fn put_strategy(&self, record: StrategyRecord) -> Result<()> {
        let mut strategies = self.strategies.write().map_err(poisoned)?;
        strategies.retain(|r| !(r.code == record.code && r.version == record.version));
        strategies.push(record);
        Ok(())
    }

    /// Make every subsequent commit fail with a persistence error.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Score rows committed for `date`, ordered by code.
    pub fn scores(&self, date: NaiveDate) -> Result<Vec<ScoreRow>> {
        let snapshots = self.snapshots.read().map_err(poisoned)?;
        Ok(snapshots.scores.get(&date).cloned().unwrap_or_default())
    }

    /// Selection rows committed for `(date, strategy)`, ordered by position.
    pub fn selections(&self, date: NaiveDate, strategy: &str) -> Result<Vec<SelectionRow>> {
        let snapshots = self.snapshots.read().map_err(poisoned)?;
        Ok(snapshots
            .selections
            .get(&(date, strategy.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    /// Every run log entry, oldest first.
    pub fn run_log(&self) -> Result<Vec<RunLogEntry>> {
        Ok(self.snapshots.read().map_err(poisoned)?.log.clone())
    }
}

impl FactorSource for MemoryStore {
    fn load_universe(&self, as_of: NaiveDate, window: &LoadWindow) -> Result<RawUniverse> {
        let raw = self.raw.read().map_err(poisoned)?;
        Ok(RawUniverse {
            as_of,
            securities: raw.securities.clone(),
            observations: raw
                .observations
                .iter()
                .filter(|o| o.period.period_end().is_some_and(|end| end <= as_of))
                .cloned()
                .collect(),
            bars: raw
                .bars
                .iter()
                .filter(|b| window.contains(b.trade_date))
                .cloned()
                .collect(),
            dividends: raw.dividends.clone(),
        })
    }

    fn latest_trade_date(&self) -> Result<Option<NaiveDate>> {
        let raw = self.raw.read().map_err(poisoned)?;
        Ok(raw.bars.iter().map(|b| b.trade_date).max())
    }

    fn trade_dates(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
        let raw = self.raw.read().map_err(poisoned)?;
        let dates: BTreeSet<NaiveDate> = raw
            .bars
            .iter()
            .map(|b| b.trade_date)
            .filter(|d| start <= *d && *d <= end)
            .collect();
        Ok(dates.into_iter().collect())
    }
}

impl StrategySource for MemoryStore {
    fn strategy_records(&self) -> Result<Vec<StrategyRecord>> {
        Ok(self.strategies.read().map_err(poisoned)?.clone())
    }
}

impl SnapshotSink for MemoryStore {
    fn commit(&self, batch: &SnapshotBatch) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(ScoringError::Persistence("store unavailable".to_string()));
        }
        let mut snapshots = self.snapshots.write().map_err(poisoned)?;
        snapshots.scores.insert(batch.as_of, batch.scores.clone());
        for (strategy, rows) in &batch.selections {
            snapshots
                .selections
                .insert((batch.as_of, strategy.clone()), rows.clone());
        }
        snapshots.log.push(batch.log.clone());
        Ok(())
    }
}
