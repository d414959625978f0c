//! End-to-end run for one as-of date.
//!
//! Stages run in a fixed order: load, score, normalize, aggregate, screen,
//! commit. Per-security work inside the load and score stages fans out over
//! rayon; every other stage sees the whole cross-section at once. The run can
//! be cancelled between stages, in which case nothing is committed.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    Result, ScoringError,
    composite::{CompositeAggregator, CompositeScore},
    config::EngineConfig,
    loader::FactorLoader,
    model::RawUniverse,
    normalize::{NormalizedScores, Normalizer},
    registry::{ScoredSecurity, ScorerRegistry},
    screener::StrategyScreener,
    snapshot::{RunLogEntry, ScoreRow, SnapshotBatch, SnapshotSink},
    source::{FactorSource, StrategySource},
};

/// Per-run state.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Date being scored
    pub as_of: NaiveDate,
    /// Strategy codes to evaluate; `None` means every active strategy
    pub strategies: Option<Vec<String>>,
    cancel: Arc<AtomicBool>,
}

impl RunContext {
    /// Context for every active strategy on `as_of`.
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            strategies: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Restrict the run to the given strategy codes.
    pub fn with_strategies(mut self, codes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.strategies = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    /// Share a cancellation flag, e.g. one flag across a backfill.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    /// Ask the run to stop at the next stage boundary.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn checkpoint(&self, stage: &'static str) -> Result<()> {
        if self.is_cancelled() {
            warn!(date = %self.as_of, stage, "run cancelled");
            return Err(ScoringError::Cancelled {
                date: self.as_of,
                stage,
            });
        }
        Ok(())
    }
}

/// The scored cross-section of one date, before screening.
#[derive(Debug, Default)]
pub struct ScoredUniverse {
    /// Scored securities, ordered by code
    pub securities: Vec<ScoredSecurity>,
    /// Peer statistics, aligned with `securities`
    pub normalized: Vec<NormalizedScores>,
    /// Composites, aligned with `securities`
    pub composites: Vec<CompositeScore>,
    /// Securities skipped for missing daily data
    pub skipped: Vec<ScoringError>,
    /// Undersized peer groups
    pub shortfalls: Vec<ScoringError>,
}

impl ScoredUniverse {
    /// Scored securities with at least one missing statement.
    pub fn partial(&self) -> usize {
        self.securities
            .iter()
            .filter(|s| s.snapshot.is_partial())
            .count()
    }
}

/// Summary of a committed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Date scored
    pub as_of: NaiveDate,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Wall-clock end
    pub finished_at: DateTime<Utc>,
    /// Securities scored
    pub scored: usize,
    /// Scored securities with at least one missing statement
    pub partial: usize,
    /// Securities skipped
    pub skipped: usize,
    /// Undersized (industry, field) peer groups
    pub peer_shortfalls: usize,
    /// Candidate count per evaluated strategy
    pub strategies: BTreeMap<String, usize>,
    /// Failed strategies with reasons
    pub failed_strategies: BTreeMap<String, String>,
}

/// The scoring engine.
#[derive(Debug)]
pub struct ScoringEngine {
    config: EngineConfig,
    registry: ScorerRegistry,
    loader: FactorLoader,
    normalizer: Normalizer,
    aggregator: CompositeAggregator,
    screener: StrategyScreener,
}

impl ScoringEngine {
    /// Validate `config` and build every stage.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let registry = ScorerRegistry::with_config(&config.scoring)?;
        Ok(Self {
            registry,
            loader: FactorLoader::new(config.loader.clone(), config.technical.clone()),
            normalizer: Normalizer::new(config.normalizer.clone()),
            aggregator: CompositeAggregator::new(config.weights, config.rating, &config.normalizer),
            screener: StrategyScreener::new(config.weights),
            config,
        })
    }

    /// Configuration in use.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Dimension scorers in use.
    pub const fn registry(&self) -> &ScorerRegistry {
        &self.registry
    }

    /// Date window a [`FactorSource`] must cover for `as_of`.
    pub fn load_window(&self, as_of: NaiveDate) -> crate::source::LoadWindow {
        self.loader.window(as_of)
    }

    /// Load, score, normalize and aggregate one raw universe.
    pub fn score_universe(&self, ctx: &RunContext, raw: &RawUniverse) -> Result<ScoredUniverse> {
        ctx.checkpoint("load")?;
        let loaded = self.loader.load(raw, self.config.parallel)?;

        ctx.checkpoint("score")?;
        let securities: Vec<ScoredSecurity> = if self.config.parallel {
            loaded
                .snapshots
                .into_par_iter()
                .map(|s| self.registry.score_security(s))
                .collect()
        } else {
            loaded
                .snapshots
                .into_iter()
                .map(|s| self.registry.score_security(s))
                .collect()
        };
        info!(date = %ctx.as_of, scored = securities.len(), "dimensions scored");

        ctx.checkpoint("normalize")?;
        let normalization = self.normalizer.normalize(&securities)?;

        ctx.checkpoint("aggregate")?;
        let composites = self.aggregator.aggregate_all(&securities, &normalization.rows);

        Ok(ScoredUniverse {
            securities,
            normalized: normalization.rows,
            composites,
            skipped: loaded.skipped,
            shortfalls: normalization.shortfalls,
        })
    }

    /// Compute and commit the snapshot of `ctx.as_of`.
    ///
    /// Re-running the same date replaces its rows. If any stage fails or the
    /// run is cancelled, nothing is committed.
    pub fn compute(
        &self,
        ctx: &RunContext,
        source: &dyn FactorSource,
        strategies: &dyn StrategySource,
        sink: &dyn SnapshotSink,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        info!(date = %ctx.as_of, "run started");

        let window = self.loader.window(ctx.as_of);
        let raw = source.load_universe(ctx.as_of, &window)?;
        let universe = self.score_universe(ctx, &raw)?;
        if universe.securities.is_empty() {
            return Err(ScoringError::Computation(format!(
                "no securities could be scored for {}",
                ctx.as_of
            )));
        }

        ctx.checkpoint("screen")?;
        let records = strategies.strategy_records()?;
        let prepared = self.screener.prepare(&records, ctx.strategies.as_deref());
        let outcome = self.screener.screen_all(
            prepared,
            ctx.as_of,
            &universe.securities,
            &universe.composites,
        );

        ctx.checkpoint("commit")?;
        let scores = universe
            .securities
            .iter()
            .zip(&universe.normalized)
            .zip(&universe.composites)
            .map(|((security, normalized), composite)| {
                ScoreRow::new(security, *normalized, composite.clone())
            })
            .collect::<Result<Vec<_>>>()?;

        let report = RunReport {
            as_of: ctx.as_of,
            started_at,
            finished_at: Utc::now(),
            scored: universe.securities.len(),
            partial: universe.partial(),
            skipped: universe.skipped.len(),
            peer_shortfalls: universe.shortfalls.len(),
            strategies: outcome
                .selections
                .iter()
                .map(|(code, rows)| (code.clone(), rows.len()))
                .collect(),
            failed_strategies: outcome.failures.clone(),
        };

        let batch = SnapshotBatch {
            as_of: ctx.as_of,
            scores,
            selections: outcome.selections,
            log: RunLogEntry {
                as_of: ctx.as_of,
                started_at: report.started_at,
                finished_at: report.finished_at,
                scored: report.scored,
                partial: report.partial,
                skipped: report.skipped,
                strategies: report.strategies.keys().cloned().collect(),
                failed_strategies: report.failed_strategies.clone(),
                success: true,
                message: report.summary(),
            },
        };
        sink.commit(&batch)?;

        info!(
            date = %ctx.as_of,
            scored = report.scored,
            skipped = report.skipped,
            strategies = report.strategies.len(),
            failed = report.failed_strategies.len(),
            "run committed"
        );
        Ok(report)
    }

    /// Trading dates to run for a backfill over `[start, end]`.
    pub fn backfill_dates(
        &self,
        source: &dyn FactorSource,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>> {
        if start > end {
            return Err(ScoringError::InvalidDateRange { start, end });
        }
        source.trade_dates(start, end)
    }
}

impl RunReport {
    /// One-line human summary.
    pub fn summary(&self) -> String {
        format!(
            "scored {} ({} partial), skipped {}, {} strategies, {} failed",
            self.scored,
            self.partial,
            self.skipped,
            self.strategies.len(),
            self.failed_strategies.len()
        )
    }
}
