//! CLI for the fd-scoring engine.
//!
//! Scores a security universe stored in SQLite, screens it through the
//! configured strategies and writes the daily snapshots back.

mod config;
mod logging;

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use fd_scoring::{
    Dimension, FactorSource, RunContext, RunReport, ScoringEngine, ScoringError, StrategySource,
    strategy::StrategyConfig,
};
use fd_scoring_sqlite::SqliteStore;
use futures::{StreamExt, stream};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "fd-scoring")]
#[command(about = "Factor scoring and strategy screening", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON config file (defaults to ./fd-scoring.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Database file, overriding the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and install the built-in strategies
    Init,
    /// Score one trading date and refresh its strategy snapshots
    Run {
        /// As-of date (defaults to the latest loaded trading date)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Only run these strategies
        #[arg(long = "strategy")]
        strategies: Vec<String>,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Score every trading date in a range
    Backfill {
        /// First date, inclusive
        #[arg(long)]
        start: NaiveDate,
        /// Last date, inclusive
        #[arg(long)]
        end: NaiveDate,
        /// Dates computed at once
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
        /// Only run these strategies
        #[arg(long = "strategy")]
        strategies: Vec<String>,
    },
    /// List the scoring dimensions and their inputs
    Dimensions,
    /// List stored strategies and whether they parse
    Strategies,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database = db;
    }
    logging::init(&config.logging)?;

    match cli.command {
        Commands::Init => init(&config),
        Commands::Run {
            date,
            strategies,
            json,
        } => run(&config, date, strategies, json).await,
        Commands::Backfill {
            start,
            end,
            concurrency,
            strategies,
        } => backfill(&config, start, end, concurrency, strategies).await,
        Commands::Dimensions => list_dimensions(&config),
        Commands::Strategies => list_strategies(&config),
    }
}

fn open_store(path: &Path) -> Result<SqliteStore> {
    SqliteStore::open(path).with_context(|| format!("opening database {}", path.display()))
}

/// Flag raised on Ctrl+C. Runs stop at their next stage boundary.
fn interrupt_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let raised = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current stage");
            raised.store(true, Ordering::SeqCst);
        }
    });
    flag
}

fn init(config: &AppConfig) -> Result<()> {
    let store = open_store(&config.database)?;
    let installed = store.install_default_strategies()?;
    info!(database = %config.database.display(), installed, "database ready");
    println!(
        "Initialized {} ({} strategies installed)",
        config.database.display(),
        installed
    );
    Ok(())
}

/// Compute one date against its own connection.
fn run_date(
    engine: &ScoringEngine,
    path: &Path,
    date: NaiveDate,
    strategies: Vec<String>,
    cancel: Arc<AtomicBool>,
) -> Result<RunReport> {
    let store = open_store(path)?;
    let mut ctx = RunContext::new(date).with_cancel_flag(cancel);
    if !strategies.is_empty() {
        ctx = ctx.with_strategies(strategies);
    }
    let report = engine
        .compute(&ctx, &store, &store, &store)
        .with_context(|| format!("scoring {date}"))?;
    Ok(report)
}

async fn run(
    config: &AppConfig,
    date: Option<NaiveDate>,
    strategies: Vec<String>,
    json: bool,
) -> Result<()> {
    let as_of = match date {
        Some(date) => date,
        None => open_store(&config.database)?
            .latest_trade_date()?
            .context("no daily bars loaded; pass --date")?,
    };
    let engine = ScoringEngine::new(config.engine.clone())?;
    let path = config.database.clone();
    let cancel = interrupt_flag();

    let report =
        tokio::task::spawn_blocking(move || run_date(&engine, &path, as_of, strategies, cancel))
            .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("{}: {}", report.as_of, report.summary());
    for (code, selected) in &report.strategies {
        println!("  {code:<20} {selected} selected");
    }
    for (code, reason) in &report.failed_strategies {
        println!("  {code:<20} FAILED: {reason}");
    }
    Ok(())
}

async fn backfill(
    config: &AppConfig,
    start: NaiveDate,
    end: NaiveDate,
    concurrency: usize,
    strategies: Vec<String>,
) -> Result<()> {
    let engine = Arc::new(ScoringEngine::new(config.engine.clone())?);
    let dates = {
        let store = open_store(&config.database)?;
        engine.backfill_dates(&store, start, end)?
    };
    if dates.is_empty() {
        warn!(%start, %end, "no trading dates in range");
        return Ok(());
    }
    info!(dates = dates.len(), concurrency, "starting backfill");

    let cancel = interrupt_flag();
    let progress = ProgressBar::new(dates.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{elapsed_precise} [{bar:40}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut outcomes: Vec<(NaiveDate, Result<RunReport>)> = stream::iter(dates)
        .map(|date| {
            let engine = Arc::clone(&engine);
            let path = config.database.clone();
            let cancel = Arc::clone(&cancel);
            let strategies = strategies.clone();
            async move {
                let outcome = tokio::task::spawn_blocking(move || {
                    run_date(&engine, &path, date, strategies, cancel)
                })
                .await
                .map_err(anyhow::Error::from)
                .and_then(|result| result);
                (date, outcome)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .inspect(|(date, _)| {
            progress.set_message(date.to_string());
            progress.inc(1);
        })
        .collect()
        .await;
    progress.finish_and_clear();

    outcomes.sort_by_key(|(date, _)| *date);
    let mut failed = 0usize;
    let mut cancelled = 0usize;
    for (date, outcome) in &outcomes {
        match outcome {
            Ok(report) => println!("{date}: {}", report.summary()),
            Err(e) if is_cancelled(e) => cancelled += 1,
            Err(e) => {
                failed += 1;
                error!(%date, error = %format!("{e:#}"), "date failed");
                println!("{date}: FAILED: {e:#}");
            }
        }
    }

    let done = outcomes.len() - failed - cancelled;
    println!("Backfill: {done} committed, {failed} failed, {cancelled} cancelled");
    if failed > 0 {
        anyhow::bail!("{failed} date(s) failed");
    }
    Ok(())
}

fn is_cancelled(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<ScoringError>(),
        Some(ScoringError::Cancelled { .. })
    )
}

fn list_dimensions(config: &AppConfig) -> Result<()> {
    let engine = ScoringEngine::new(config.engine.clone())?;
    let infos = engine.registry().all_info();
    println!("Scoring dimensions ({} total)\n", infos.len());
    for info in infos {
        let weight = Dimension::from_name(&info.name)
            .map_or_else(|| "-".to_string(), |d| format!("{}", config.engine.weights.get(d)));
        println!("{} (weight {weight}, {})", info.name, info.frequency);
        println!("  {}", info.description);
        for component in &info.components {
            println!(
                "    {:<24} x{:<4} {}",
                component.input.to_string(),
                component.weight,
                serde_json::to_string(&component.curve)?
            );
        }
        println!();
    }
    Ok(())
}

fn list_strategies(config: &AppConfig) -> Result<()> {
    let store = open_store(&config.database)?;
    let mut records = store.strategy_records()?;
    records.sort_by(|a, b| {
        (a.display_order, &a.code, a.version).cmp(&(b.display_order, &b.code, b.version))
    });
    if records.is_empty() {
        println!("No strategies stored; run `fd-scoring init`");
        return Ok(());
    }
    println!(
        "{:<20} {:>3} {:<10} {:<7} STATUS",
        "CODE", "VER", "TYPE", "ACTIVE"
    );
    for record in &records {
        let status = match StrategyConfig::from_record(record) {
            Ok(_) => "ok".to_string(),
            Err(e) => e.to_string(),
        };
        println!(
            "{:<20} {:>3} {:<10} {:<7} {status}",
            record.code, record.version, record.strategy_type, record.active
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::parse_from([
            "fd-scoring",
            "run",
            "--date",
            "2024-06-03",
            "--strategy",
            "low_pb_value",
            "--strategy",
            "core_rated",
        ]);
        match cli.command {
            Commands::Run {
                date,
                strategies,
                json,
            } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 6, 3));
                assert_eq!(strategies, vec!["low_pb_value", "core_rated"]);
                assert!(!json);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_bad_date_is_rejected() {
        assert!(Cli::try_parse_from(["fd-scoring", "run", "--date", "2024-13-01"]).is_err());
    }

    #[test]
    fn test_run_date_on_empty_database_fails_without_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        let engine = ScoringEngine::new(Default::default()).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();

        let err = run_date(
            &engine,
            &path,
            date,
            Vec::new(),
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScoringError>(),
            Some(ScoringError::Computation(_))
        ));
        assert!(open_store(&path).unwrap().run_log().unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_errors_are_recognized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cancel.db");
        let engine = ScoringEngine::new(Default::default()).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();

        let err = run_date(
            &engine,
            &path,
            date,
            Vec::new(),
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap_err();
        assert!(is_cancelled(&err));
    }
}
