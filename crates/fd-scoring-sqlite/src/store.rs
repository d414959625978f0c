//! SQLite implementation of the store interfaces.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use chrono::NaiveDate;
use fd_scoring::{
    Result, ScoringError,
    model::{
        ClassificationEvent, DailyBar, DividendEvent, FiscalPeriod, ListingStatus, Metric,
        RawFactorObservation, RawUniverse, Security,
    },
    snapshot::{RunLogEntry, ScoreRow, SelectionRow, SnapshotBatch, SnapshotSink},
    source::{FactorSource, LoadWindow, StrategySource},
    strategy::{StrategyRecord, default_strategies},
};
use rusqlite::{
    Connection, OptionalExtension, Row, Transaction, params, params_from_iter,
    types::{Type, Value},
};
use tracing::{debug, info};

use crate::schema::{SCHEMA, SCHEMA_VERSION, insert_score_sql};

/// Maps driver errors into the engine's persistence error.
trait PersistExt<T> {
    fn persist(self) -> Result<T>;
}

impl<T> PersistExt<T> for rusqlite::Result<T> {
    fn persist(self) -> Result<T> {
        self.map_err(|e| ScoringError::Persistence(e.to_string()))
    }
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

const fn real(value: Option<f64>) -> Value {
    match value {
        Some(v) => Value::Real(v),
        None => Value::Null,
    }
}

fn text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::Text(s.to_string()))
}

/// A raw-factor, strategy and snapshot store in one SQLite database.
///
/// Every read of [`FactorSource::load_universe`] runs inside one transaction,
/// and every [`SnapshotSink::commit`] is one write transaction.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and bring its schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).persist()?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .persist()?;
        info!(path = %path.display(), "database opened");
        Self::with_connection(conn)
    }

    /// A private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().persist()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON").persist()?;
        conn.busy_timeout(Duration::from_secs(5)).persist()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ScoringError::Persistence("connection lock poisoned".to_string()))
    }

    /// Create missing tables and record the schema version.
    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        let current: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .persist()?;
        if current > SCHEMA_VERSION {
            return Err(ScoringError::Persistence(format!(
                "database schema version {current} is newer than supported {SCHEMA_VERSION}"
            )));
        }
        conn.execute_batch(SCHEMA).persist()?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION).persist()?;
        debug!(from = current, to = SCHEMA_VERSION, "schema migrated");
        Ok(())
    }

    /// Insert or replace reference data, including classification history.
    pub fn insert_securities(&self, securities: &[Security]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().persist()?;
        {
            let mut upsert = tx
                .prepare(
                    "INSERT INTO securities (code, name, list_date, delist_date, total_shares, float_shares)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(code) DO UPDATE SET
                        name = excluded.name,
                        list_date = excluded.list_date,
                        delist_date = excluded.delist_date,
                        total_shares = excluded.total_shares,
                        float_shares = excluded.float_shares",
                )
                .persist()?;
            let mut clear = tx
                .prepare("DELETE FROM classification_events WHERE code = ?1")
                .persist()?;
            let mut event = tx
                .prepare(
                    "INSERT INTO classification_events (code, effective, industry, status)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .persist()?;
            for security in securities {
                upsert
                    .execute(params![
                        security.code,
                        security.name,
                        security.list_date,
                        security.delist_date,
                        security.total_shares,
                        security.float_shares,
                    ])
                    .persist()?;
                clear.execute(params![security.code]).persist()?;
                for e in &security.events {
                    event
                        .execute(params![security.code, e.effective, e.industry, e.status.as_str()])
                        .persist()?;
                }
            }
        }
        tx.commit().persist()?;
        Ok(securities.len())
    }

    /// Insert fundamentals; a value with the same key and publication date
    /// is replaced.
    pub fn insert_observations(&self, observations: &[RawFactorObservation]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().persist()?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO fundamentals (code, year, quarter, metric, value, published)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .persist()?;
            for obs in observations {
                stmt.execute(params![
                    obs.code,
                    obs.period.year,
                    obs.period.quarter,
                    obs.metric.as_str(),
                    obs.value,
                    obs.published,
                ])
                .persist()?;
            }
        }
        tx.commit().persist()?;
        Ok(observations.len())
    }

    /// Insert or replace daily bars.
    pub fn insert_bars(&self, bars: &[DailyBar]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().persist()?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO daily_bars
                        (code, trade_date, close, volume, amount, turnover, pe_ttm, pb_mrq, ps_ttm, is_st, tradable)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                )
                .persist()?;
            for bar in bars {
                stmt.execute(params![
                    bar.code,
                    bar.trade_date,
                    bar.close,
                    bar.volume,
                    bar.amount,
                    bar.turnover,
                    bar.pe_ttm,
                    bar.pb_mrq,
                    bar.ps_ttm,
                    bar.is_st,
                    bar.tradable,
                ])
                .persist()?;
            }
        }
        tx.commit().persist()?;
        Ok(bars.len())
    }

    /// Insert or replace dividend events.
    pub fn insert_dividends(&self, events: &[DividendEvent]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().persist()?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO dividends (code, year, cash_per_share, plan_date, operate_date, pay_date)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .persist()?;
            for e in events {
                stmt.execute(params![
                    e.code,
                    e.year,
                    e.cash_per_share,
                    e.plan_date,
                    e.operate_date,
                    e.pay_date,
                ])
                .persist()?;
            }
        }
        tx.commit().persist()?;
        Ok(events.len())
    }

    /// Insert or replace a strategy version.
    pub fn put_strategy(&self, record: &StrategyRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO strategies
                (code, version, name, strategy_type, filters, weights, score_basis, max_candidates, active, display_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.code,
                record.version,
                record.name,
                record.strategy_type,
                record.filters,
                record.weights,
                record.score_basis,
                record.max_candidates,
                record.active,
                record.display_order,
            ],
        )
        .persist()?;
        Ok(())
    }

    /// Install the built-in strategies whose codes are not stored yet.
    pub fn install_default_strategies(&self) -> Result<usize> {
        let mut installed = 0;
        for record in default_strategies() {
            let exists = {
                let conn = self.lock()?;
                conn.query_row(
                    "SELECT 1 FROM strategies WHERE code = ?1 LIMIT 1",
                    params![record.code],
                    |_| Ok(()),
                )
                .optional()
                .persist()?
                .is_some()
            };
            if !exists {
                self.put_strategy(&record)?;
                installed += 1;
            }
        }
        info!(installed, "default strategies installed");
        Ok(installed)
    }

    /// Score rows stored for `date`, ordered by code.
    pub fn scores(&self, date: NaiveDate) -> Result<Vec<ScoreRow>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT payload FROM factor_scores WHERE trade_date = ?1 ORDER BY code")
            .persist()?;
        let payloads = stmt
            .query_map(params![date], |row| row.get::<_, String>(0))
            .persist()?
            .collect::<rusqlite::Result<Vec<_>>>()
            .persist()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(ScoringError::from))
            .collect()
    }

    /// Selection rows stored for `(date, strategy)`, ordered by position.
    pub fn selections(&self, date: NaiveDate, strategy: &str) -> Result<Vec<SelectionRow>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT payload FROM strategy_snapshots
                 WHERE run_date = ?1 AND strategy_code = ?2 ORDER BY position",
            )
            .persist()?;
        let payloads = stmt
            .query_map(params![date, strategy], |row| row.get::<_, String>(0))
            .persist()?
            .collect::<rusqlite::Result<Vec<_>>>()
            .persist()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(ScoringError::from))
            .collect()
    }

    /// Every run log entry, oldest first.
    pub fn run_log(&self) -> Result<Vec<RunLogEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT payload FROM run_log ORDER BY id")
            .persist()?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .persist()?
            .collect::<rusqlite::Result<Vec<_>>>()
            .persist()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(ScoringError::from))
            .collect()
    }
}

fn security_from_row(row: &Row<'_>) -> rusqlite::Result<Security> {
    Ok(Security {
        code: row.get(0)?,
        name: row.get(1)?,
        list_date: row.get(2)?,
        delist_date: row.get(3)?,
        total_shares: row.get(4)?,
        float_shares: row.get(5)?,
        events: Vec::new(),
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<(String, ClassificationEvent)> {
    let status: String = row.get(3)?;
    let status = ListingStatus::from_name(&status)
        .ok_or_else(|| conversion_error(3, format!("unknown listing status `{status}`")))?;
    Ok((
        row.get(0)?,
        ClassificationEvent {
            effective: row.get(1)?,
            industry: row.get(2)?,
            status,
        },
    ))
}

fn observation_from_row(row: &Row<'_>) -> rusqlite::Result<RawFactorObservation> {
    let metric: String = row.get(3)?;
    let metric = Metric::from_name(&metric)
        .ok_or_else(|| conversion_error(3, format!("unknown metric `{metric}`")))?;
    Ok(RawFactorObservation {
        code: row.get(0)?,
        period: FiscalPeriod::new(row.get(1)?, row.get(2)?),
        metric,
        value: row.get(4)?,
        published: row.get(5)?,
    })
}

fn bar_from_row(row: &Row<'_>) -> rusqlite::Result<DailyBar> {
    Ok(DailyBar {
        code: row.get(0)?,
        trade_date: row.get(1)?,
        close: row.get(2)?,
        volume: row.get(3)?,
        amount: row.get(4)?,
        turnover: row.get(5)?,
        pe_ttm: row.get(6)?,
        pb_mrq: row.get(7)?,
        ps_ttm: row.get(8)?,
        is_st: row.get(9)?,
        tradable: row.get(10)?,
    })
}

fn dividend_from_row(row: &Row<'_>) -> rusqlite::Result<DividendEvent> {
    Ok(DividendEvent {
        code: row.get(0)?,
        year: row.get(1)?,
        cash_per_share: row.get(2)?,
        plan_date: row.get(3)?,
        operate_date: row.get(4)?,
        pay_date: row.get(5)?,
    })
}

fn strategy_from_row(row: &Row<'_>) -> rusqlite::Result<StrategyRecord> {
    Ok(StrategyRecord {
        code: row.get(0)?,
        version: row.get(1)?,
        name: row.get(2)?,
        strategy_type: row.get(3)?,
        filters: row.get(4)?,
        weights: row.get(5)?,
        score_basis: row.get(6)?,
        max_candidates: row.get(7)?,
        active: row.get(8)?,
        display_order: row.get(9)?,
    })
}

fn read_universe(tx: &Transaction<'_>, as_of: NaiveDate, window: &LoadWindow) -> rusqlite::Result<RawUniverse> {
    let mut securities: Vec<Security> = tx
        .prepare(
            "SELECT code, name, list_date, delist_date, total_shares, float_shares
             FROM securities WHERE list_date <= ?1 ORDER BY code",
        )?
        .query_map(params![as_of], security_from_row)?
        .collect::<rusqlite::Result<_>>()?;

    let mut events: HashMap<String, Vec<ClassificationEvent>> = HashMap::new();
    let mut stmt = tx.prepare(
        "SELECT code, effective, industry, status FROM classification_events
         WHERE effective <= ?1 ORDER BY code, effective",
    )?;
    for row in stmt.query_map(params![as_of], event_from_row)? {
        let (code, event) = row?;
        events.entry(code).or_default().push(event);
    }
    for security in &mut securities {
        security.events = events.remove(&security.code).unwrap_or_default();
    }

    let observations = tx
        .prepare(
            "SELECT code, year, quarter, metric, value, published FROM fundamentals
             WHERE published IS NULL OR published <= ?1",
        )?
        .query_map(params![as_of], observation_from_row)?
        .collect::<rusqlite::Result<_>>()?;

    let bars = tx
        .prepare(
            "SELECT code, trade_date, close, volume, amount, turnover, pe_ttm, pb_mrq, ps_ttm, is_st, tradable
             FROM daily_bars WHERE trade_date BETWEEN ?1 AND ?2 ORDER BY code, trade_date",
        )?
        .query_map(params![window.start, window.end], bar_from_row)?
        .collect::<rusqlite::Result<_>>()?;

    let dividends = tx
        .prepare(
            "SELECT code, year, cash_per_share, plan_date, operate_date, pay_date FROM dividends
             WHERE COALESCE(pay_date, operate_date, plan_date) <= ?1",
        )?
        .query_map(params![as_of], dividend_from_row)?
        .collect::<rusqlite::Result<_>>()?;

    Ok(RawUniverse {
        as_of,
        securities,
        observations,
        bars,
        dividends,
    })
}

impl FactorSource for SqliteStore {
    fn load_universe(&self, as_of: NaiveDate, window: &LoadWindow) -> Result<RawUniverse> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().persist()?;
        let raw = read_universe(&tx, as_of, window).persist()?;
        tx.finish().persist()?;
        debug!(
            date = %as_of,
            securities = raw.securities.len(),
            observations = raw.observations.len(),
            bars = raw.bars.len(),
            dividends = raw.dividends.len(),
            "universe read"
        );
        Ok(raw)
    }

    fn latest_trade_date(&self) -> Result<Option<NaiveDate>> {
        let conn = self.lock()?;
        conn.query_row("SELECT MAX(trade_date) FROM daily_bars", [], |row| row.get(0))
            .persist()
    }

    fn trade_dates(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT trade_date FROM daily_bars
                 WHERE trade_date BETWEEN ?1 AND ?2 ORDER BY trade_date",
            )
            .persist()?;
        stmt.query_map(params![start, end], |row| row.get(0))
            .persist()?
            .collect::<rusqlite::Result<_>>()
            .persist()
    }
}

impl StrategySource for SqliteStore {
    fn strategy_records(&self) -> Result<Vec<StrategyRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT code, version, name, strategy_type, filters, weights, score_basis,
                        max_candidates, active, display_order
                 FROM strategies ORDER BY display_order, code, version",
            )
            .persist()?;
        stmt.query_map([], strategy_from_row)
            .persist()?
            .collect::<rusqlite::Result<_>>()
            .persist()
    }
}

fn score_values(row: &ScoreRow) -> Result<Vec<Value>> {
    let mut values = vec![
        Value::Text(row.code.clone()),
        Value::Text(row.trade_date.to_string()),
        Value::Text(row.industry.clone()),
    ];
    values.extend(row.scores.iter().map(|(_, score)| real(score)));
    let composite = &row.composite;
    values.extend([
        real(composite.total_score),
        text(composite.rating.map(|r| r.as_str())),
        real(composite.neutral_total_score),
        text(composite.neutral_rating.map(|r| r.as_str())),
        composite
            .total_rank
            .map_or(Value::Null, |r| Value::Integer(i64::from(r))),
        Value::Text(serde_json::to_string(row)?),
    ]);
    Ok(values)
}

fn write_batch(tx: &Transaction<'_>, batch: &SnapshotBatch) -> Result<()> {
    tx.execute(
        "DELETE FROM factor_scores WHERE trade_date = ?1",
        params![batch.as_of],
    )
    .persist()?;
    let mut insert = tx.prepare(&insert_score_sql()).persist()?;
    for row in &batch.scores {
        insert.execute(params_from_iter(score_values(row)?)).persist()?;
    }

    let mut clear = tx
        .prepare("DELETE FROM strategy_snapshots WHERE run_date = ?1 AND strategy_code = ?2")
        .persist()?;
    let mut select = tx
        .prepare(
            "INSERT INTO strategy_snapshots
                (run_date, strategy_code, code, strategy_version, position, strategy_score, total_score, rating, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .persist()?;
    for (strategy, rows) in &batch.selections {
        clear.execute(params![batch.as_of, strategy]).persist()?;
        for row in rows {
            select
                .execute(params![
                    row.run_date,
                    row.strategy_code,
                    row.code,
                    row.strategy_version,
                    row.position,
                    row.strategy_score,
                    row.total_score,
                    row.rating.map(|r| r.as_str()),
                    serde_json::to_string(row)?,
                ])
                .persist()?;
        }
    }

    let log = &batch.log;
    tx.execute(
        "INSERT INTO run_log (as_of, started_at, finished_at, scored, partial, skipped, success, message, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            log.as_of,
            log.started_at,
            log.finished_at,
            log.scored as i64,
            log.partial as i64,
            log.skipped as i64,
            log.success,
            log.message,
            serde_json::to_string(log)?,
        ],
    )
    .persist()?;
    Ok(())
}

impl SnapshotSink for SqliteStore {
    fn commit(&self, batch: &SnapshotBatch) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().persist()?;
        // Dropping the transaction on error rolls it back
        write_batch(&tx, batch)?;
        tx.commit().persist()?;
        info!(
            date = %batch.as_of,
            scores = batch.scores.len(),
            strategies = batch.selections.len(),
            "snapshot committed"
        );
        Ok(())
    }
}
