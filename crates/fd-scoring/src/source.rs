//! Read-side interfaces to the external stores.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Result, model::RawUniverse, strategy::StrategyRecord};

/// Inclusive date range of daily history needed for one as-of date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadWindow {
    /// First date of daily history
    pub start: NaiveDate,
    /// As-of date
    pub end: NaiveDate,
}

impl LoadWindow {
    /// Whether `date` falls inside the window.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// The raw factor store.
///
/// Implementations must serve each call from one consistent snapshot, so a
/// concurrent writer never produces a half-updated universe.
pub trait FactorSource: Send + Sync {
    /// Read reference data, fundamentals, daily bars within `window` and
    /// dividend history for `as_of`.
    ///
    /// Fundamentals may include observations published after `as_of`; the
    /// loader filters them.
    fn load_universe(&self, as_of: NaiveDate, window: &LoadWindow) -> Result<RawUniverse>;

    /// Most recent date with daily bars, if any.
    fn latest_trade_date(&self) -> Result<Option<NaiveDate>>;

    /// Distinct dates with daily bars in `[start, end]`, ascending.
    fn trade_dates(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>>;
}

/// The strategy configuration store.
pub trait StrategySource: Send + Sync {
    /// All stored strategy records, active or not.
    fn strategy_records(&self) -> Result<Vec<StrategyRecord>>;
}
