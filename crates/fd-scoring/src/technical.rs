//! Technical indicators derived from the daily price/valuation series.
//!
//! Moving averages and average traded amount are computed with a grouped
//! lazy query over the whole bar window at once; the "days below valuation
//! percentile" run length is a per-security scan.

use std::collections::HashMap;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{Result, config::TechnicalConfig, model::DailyBar};

/// Technical factors for one security on the as-of date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalFactors {
    /// Short moving average of close (null without a full window)
    pub ma_short: Option<f64>,
    /// Medium moving average of close
    pub ma_mid: Option<f64>,
    /// Long moving average of close
    pub ma_long: Option<f64>,
    /// Average traded amount over the amount window
    pub avg_amount: Option<f64>,
    /// Consecutive most recent bars with P/B at or below its trailing
    /// percentile threshold
    pub days_below_pb_percentile: Option<u32>,
}

/// Build the bar frame used by [`moving_averages`].
///
/// Columns: `code`, `trade_date` (ISO string), `close`, `amount`.
pub fn bars_frame(bars: &[&DailyBar]) -> Result<DataFrame> {
    let codes: Vec<&str> = bars.iter().map(|b| b.code.as_str()).collect();
    let dates: Vec<String> = bars
        .iter()
        .map(|b| b.trade_date.format("%Y-%m-%d").to_string())
        .collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let amounts: Vec<Option<f64>> = bars.iter().map(|b| b.amount).collect();

    let df = df![
        "code" => codes,
        "trade_date" => dates,
        "close" => closes,
        "amount" => amounts,
    ]?;
    Ok(df)
}

/// Moving averages of close and average traded amount per security.
///
/// Only bars on or before `date` are used. A moving average is null unless
/// a full window of bars is available.
///
/// # Returns
///
/// DataFrame with columns: `code`, `ma_short`, `ma_mid`, `ma_long`, `avg_amount`.
pub fn moving_averages(
    data: &LazyFrame,
    date: NaiveDate,
    config: &TechnicalConfig,
) -> Result<DataFrame> {
    let windowed = |column: &str, window: usize| {
        col(column)
            .sort_by([col("trade_date")], SortMultipleOptions::default())
            .tail(Some(window))
    };
    let full_window = |ma: &str, count: &str, window: usize| {
        when(col(count).cast(DataType::Int64).gt_eq(lit(window as i64)))
            .then(col(ma))
            .otherwise(lit(NULL).cast(DataType::Float64))
            .alias(ma)
    };

    let result = data
        .clone()
        .filter(col("trade_date").lt_eq(lit(date.format("%Y-%m-%d").to_string())))
        .group_by([col("code")])
        .agg([
            windowed("close", config.ma_short).mean().alias("ma_short"),
            windowed("close", config.ma_short).count().alias("n_short"),
            windowed("close", config.ma_mid).mean().alias("ma_mid"),
            windowed("close", config.ma_mid).count().alias("n_mid"),
            windowed("close", config.ma_long).mean().alias("ma_long"),
            windowed("close", config.ma_long).count().alias("n_long"),
            windowed("amount", config.amount_window)
                .mean()
                .alias("avg_amount"),
        ])
        .with_columns([
            full_window("ma_short", "n_short", config.ma_short),
            full_window("ma_mid", "n_mid", config.ma_mid),
            full_window("ma_long", "n_long", config.ma_long),
        ])
        .select([
            col("code"),
            col("ma_short"),
            col("ma_mid"),
            col("ma_long"),
            col("avg_amount").cast(DataType::Float64),
        ])
        .collect()?;

    Ok(result)
}

/// Length of the current run of bars whose P/B is at or below the
/// `quantile` of P/B over the trailing `window` bars.
///
/// `pb` is ordered oldest to newest. A bar without P/B ends the run. Returns
/// `None` when fewer than half the window has a P/B value.
pub fn days_below_percentile(pb: &[Option<f64>], window: usize, quantile: f64) -> Option<u32> {
    let start = pb.len().saturating_sub(window);
    let trailing = &pb[start..];
    let mut present: Vec<f64> = trailing
        .iter()
        .flatten()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    if present.is_empty() || present.len() * 2 < window {
        return None;
    }
    present.sort_by(f64::total_cmp);
    let threshold = linear_quantile(&present, quantile);

    let run = trailing
        .iter()
        .rev()
        .take_while(|v| v.is_some_and(|pb| pb <= threshold))
        .count();
    u32::try_from(run).ok()
}

/// Linear-interpolated quantile of an ascending, non-empty slice.
fn linear_quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Compute all technical factors for the securities present in `bars`.
pub fn compute_technicals(
    bars: &[&DailyBar],
    date: NaiveDate,
    config: &TechnicalConfig,
) -> Result<HashMap<String, TechnicalFactors>> {
    let frame = bars_frame(bars)?;
    let averages = moving_averages(&frame.lazy(), date, config)?;

    let codes = averages.column("code")?.str()?;
    let ma_short = averages.column("ma_short")?.f64()?;
    let ma_mid = averages.column("ma_mid")?.f64()?;
    let ma_long = averages.column("ma_long")?.f64()?;
    let avg_amount = averages.column("avg_amount")?.f64()?;

    let mut factors = HashMap::with_capacity(averages.height());
    for idx in 0..averages.height() {
        if let Some(code) = codes.get(idx) {
            factors.insert(
                code.to_string(),
                TechnicalFactors {
                    ma_short: ma_short.get(idx),
                    ma_mid: ma_mid.get(idx),
                    ma_long: ma_long.get(idx),
                    avg_amount: avg_amount.get(idx),
                    days_below_pb_percentile: None,
                },
            );
        }
    }

    let mut pb_by_code: HashMap<&str, Vec<(NaiveDate, Option<f64>)>> = HashMap::new();
    for bar in bars.iter().filter(|b| b.trade_date <= date) {
        pb_by_code
            .entry(bar.code.as_str())
            .or_default()
            .push((bar.trade_date, bar.pb_mrq));
    }
    for (code, mut series) in pb_by_code {
        series.sort_by_key(|(d, _)| *d);
        let pb: Vec<Option<f64>> = series.into_iter().map(|(_, v)| v).collect();
        if let Some(entry) = factors.get_mut(code) {
            entry.days_below_pb_percentile =
                days_below_percentile(&pb, config.percentile_window, config.percentile_quantile);
        }
    }

    Ok(factors)
}
