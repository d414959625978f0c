//! Table definitions.

use fd_scoring::Dimension;

/// Schema version written to `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

pub(crate) const SCHEMA: &str = r#"
-- Reference data
CREATE TABLE IF NOT EXISTS securities (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    list_date TEXT NOT NULL,
    delist_date TEXT,
    total_shares REAL,
    float_shares REAL
);

CREATE TABLE IF NOT EXISTS classification_events (
    code TEXT NOT NULL REFERENCES securities(code) ON DELETE CASCADE,
    effective TEXT NOT NULL,
    industry TEXT,
    status TEXT NOT NULL,
    PRIMARY KEY (code, effective)
);

-- Quarterly fundamentals, one row per published value
CREATE TABLE IF NOT EXISTS fundamentals (
    code TEXT NOT NULL,
    year INTEGER NOT NULL,
    quarter INTEGER NOT NULL CHECK (quarter BETWEEN 1 AND 4),
    metric TEXT NOT NULL,
    value REAL NOT NULL,
    published TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_fundamentals_key
ON fundamentals(code, year, quarter, metric, COALESCE(published, ''));

CREATE INDEX IF NOT EXISTS idx_fundamentals_published
ON fundamentals(published);

-- Daily price and valuation series
CREATE TABLE IF NOT EXISTS daily_bars (
    code TEXT NOT NULL,
    trade_date TEXT NOT NULL,
    close REAL NOT NULL,
    volume REAL,
    amount REAL,
    turnover REAL,
    pe_ttm REAL,
    pb_mrq REAL,
    ps_ttm REAL,
    is_st INTEGER NOT NULL DEFAULT 0,
    tradable INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (code, trade_date)
);

CREATE INDEX IF NOT EXISTS idx_daily_bars_date
ON daily_bars(trade_date);

-- Cash dividends
CREATE TABLE IF NOT EXISTS dividends (
    code TEXT NOT NULL,
    year INTEGER NOT NULL,
    cash_per_share REAL,
    plan_date TEXT,
    operate_date TEXT,
    pay_date TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_dividends_key
ON dividends(code, year, COALESCE(pay_date, operate_date, plan_date, ''));

-- Strategy configurations, versioned by code
CREATE TABLE IF NOT EXISTS strategies (
    code TEXT NOT NULL,
    version INTEGER NOT NULL,
    name TEXT NOT NULL,
    strategy_type TEXT NOT NULL,
    filters TEXT NOT NULL DEFAULT '{}',
    weights TEXT NOT NULL DEFAULT '{}',
    score_basis TEXT NOT NULL DEFAULT 'default',
    max_candidates INTEGER,
    active INTEGER NOT NULL DEFAULT 1,
    display_order INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (code, version)
);

-- Per-(security, date) scores
CREATE TABLE IF NOT EXISTS factor_scores (
    code TEXT NOT NULL,
    trade_date TEXT NOT NULL,
    industry TEXT NOT NULL,
    profitability_score REAL,
    operation_score REAL,
    growth_score REAL,
    solvency_score REAL,
    cash_flow_score REAL,
    valuation_score REAL,
    dividend_score REAL,
    size_liquidity_score REAL,
    total_score REAL,
    rating TEXT,
    neutral_total_score REAL,
    neutral_rating TEXT,
    total_rank INTEGER,
    payload TEXT NOT NULL,
    PRIMARY KEY (code, trade_date)
);

CREATE INDEX IF NOT EXISTS idx_factor_scores_date
ON factor_scores(trade_date, total_score DESC);

-- Per-(run date, strategy, security) candidates
CREATE TABLE IF NOT EXISTS strategy_snapshots (
    run_date TEXT NOT NULL,
    strategy_code TEXT NOT NULL,
    code TEXT NOT NULL,
    strategy_version INTEGER NOT NULL,
    position INTEGER NOT NULL,
    strategy_score REAL,
    total_score REAL,
    rating TEXT,
    payload TEXT NOT NULL,
    PRIMARY KEY (run_date, strategy_code, code)
);

-- One row per committed run
CREATE TABLE IF NOT EXISTS run_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    as_of TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    scored INTEGER NOT NULL,
    partial INTEGER NOT NULL,
    skipped INTEGER NOT NULL,
    success INTEGER NOT NULL,
    message TEXT NOT NULL,
    payload TEXT NOT NULL
);
"#;

/// `INSERT` for one score row; parameters follow [`Dimension::ALL`] for the
/// sub-score columns.
pub(crate) fn insert_score_sql() -> String {
    let columns: Vec<&str> = Dimension::ALL.iter().map(|d| d.score_column()).collect();
    let total = 3 + columns.len() + 6;
    let placeholders: Vec<String> = (1..=total).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO factor_scores (code, trade_date, industry, {}, total_score, rating, \
         neutral_total_score, neutral_rating, total_rank, payload) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    )
}
