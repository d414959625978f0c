//! Output records and the write-side interface.
//!
//! A run produces one [`SnapshotBatch`]: every score row for the as-of date,
//! the selection rows of every strategy evaluated, and a run log entry. A
//! [`SnapshotSink`] commits the batch atomically, replacing whatever the
//! same date (and the same strategies) held before.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    composite::{CompositeScore, Rating},
    loader::StatementSource,
    normalize::NormalizedScores,
    registry::{DimensionScores, ScoredSecurity},
};

/// One (security, trade date) row of the score table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    /// Security code
    pub code: String,
    /// As-of date
    pub trade_date: NaiveDate,
    /// Industry used for normalization
    pub industry: String,
    /// Raw sub-scores
    pub scores: DimensionScores,
    /// Peer statistics
    pub normalized: NormalizedScores,
    /// Totals, ratings and rank
    pub composite: CompositeScore,
    /// Statement periods the fundamentals came from
    pub sources: Vec<StatementSource>,
    /// Inputs used, for audit
    pub inputs: serde_json::Value,
}

impl ScoreRow {
    /// Assemble the row of one security.
    pub fn new(
        security: &ScoredSecurity,
        normalized: NormalizedScores,
        composite: CompositeScore,
    ) -> Result<Self> {
        let snapshot = &security.snapshot;
        Ok(Self {
            code: snapshot.code.clone(),
            trade_date: snapshot.as_of,
            industry: snapshot.industry.clone(),
            scores: security.scores,
            normalized,
            composite,
            sources: snapshot.sources.clone(),
            inputs: serde_json::to_value(snapshot)?,
        })
    }
}

/// One (run date, strategy, security) row of the selection snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRow {
    /// As-of date of the run
    pub run_date: NaiveDate,
    /// Strategy code
    pub strategy_code: String,
    /// Strategy version evaluated
    pub strategy_version: u32,
    /// Security code
    pub code: String,
    /// 1-based position in the candidate list
    pub position: u32,
    /// Strategy score
    pub strategy_score: Option<f64>,
    /// Composite total at selection time
    pub total_score: Option<f64>,
    /// Rating at selection time
    pub rating: Option<Rating>,
    /// Sub-scores at selection time
    pub scores: DimensionScores,
    /// Filter inputs that qualified the security
    pub filter_inputs: BTreeMap<String, serde_json::Value>,
}

/// Outcome of one engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    /// As-of date
    pub as_of: NaiveDate,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Wall-clock end
    pub finished_at: DateTime<Utc>,
    /// Securities scored
    pub scored: usize,
    /// Scored securities with at least one missing statement
    pub partial: usize,
    /// Securities skipped for missing daily data
    pub skipped: usize,
    /// Strategies evaluated
    pub strategies: Vec<String>,
    /// Strategies that failed validation, with reasons
    pub failed_strategies: BTreeMap<String, String>,
    /// Whether the run succeeded
    pub success: bool,
    /// Summary message
    pub message: String,
}

/// Everything a run writes for one as-of date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBatch {
    /// As-of date
    pub as_of: NaiveDate,
    /// Score rows, ordered by code
    pub scores: Vec<ScoreRow>,
    /// Selection rows per evaluated strategy, ordered by position. A
    /// strategy with an empty list replaces its previous rows with nothing.
    pub selections: BTreeMap<String, Vec<SelectionRow>>,
    /// Run log entry
    pub log: RunLogEntry,
}

/// The snapshot store.
pub trait SnapshotSink: Send + Sync {
    /// Atomically replace the batch's date.
    ///
    /// All score rows for `as_of` and the selection rows of
    /// `(as_of, strategy)` for each strategy in `selections` are replaced;
    /// selections of strategies not in the batch are left untouched. On
    /// error nothing is written.
    fn commit(&self, batch: &SnapshotBatch) -> Result<()>;
}
