//! Standardization utilities for cross-sectional values.
//!
//! Z-scores are computed within a partition (industry) rather than across
//! the whole universe, so securities are compared with their peers only.

use polars::prelude::*;

use crate::Result;

/// Name of the z-score column produced for `value_column`.
pub fn zscore_column(value_column: &str) -> String {
    format!("{value_column}_zscore")
}

/// Within-partition z-score standardization.
///
/// Adds `<column>_zscore = (x - mean(x)) / std(x)` for every value column,
/// where mean and sample standard deviation are taken over the non-null
/// values of the row's partition. The z-score is null when the value is
/// null, the partition has fewer than `min_size` non-null values, or its
/// standard deviation is at most `epsilon`.
///
/// # Arguments
///
/// * `df` - DataFrame with the partition column and the value columns
/// * `value_columns` - Columns to standardize
/// * `partition_column` - Column defining peer groups, e.g. `industry`
/// * `min_size` - Smallest partition that gets z-scores
/// * `epsilon` - Standard deviations at or below this count as zero variance
///
/// # Returns
///
/// The input DataFrame, rows in their original order, with the z-score
/// columns appended.
pub fn partition_zscores(
    df: &DataFrame,
    value_columns: &[&str],
    partition_column: &str,
    min_size: usize,
    epsilon: f64,
) -> Result<DataFrame> {
    let zscores: Vec<Expr> = value_columns
        .iter()
        .map(|column| {
            let count = col(*column)
                .count()
                .over([col(partition_column)])
                .cast(DataType::Int64);
            let mean = col(*column).mean().over([col(partition_column)]);
            let std = col(*column).std(1).over([col(partition_column)]);

            when(
                count
                    .lt(lit(min_size as i64))
                    .or(std.clone().is_null())
                    .or(std.clone().lt_eq(lit(epsilon))),
            )
            .then(lit(NULL).cast(DataType::Float64))
            .otherwise((col(*column) - mean) / std)
            .alias(zscore_column(column))
        })
        .collect();

    let result = df.clone().lazy().with_columns(zscores).collect()?;
    Ok(result)
}
