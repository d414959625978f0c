//! Error types for the scoring engine.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type for scoring operations.
pub type Result<T> = std::result::Result<T, ScoringError>;

/// Errors that can occur while scoring and screening a trading date.
///
/// The variants follow the isolation policy of a run: [`MissingData`] and
/// [`InsufficientPeerGroup`] are recorded per security and never abort the
/// batch, [`Configuration`] halts a single strategy, and [`Persistence`]
/// aborts the whole run without committing anything.
///
/// [`MissingData`]: ScoringError::MissingData
/// [`InsufficientPeerGroup`]: ScoringError::InsufficientPeerGroup
/// [`Configuration`]: ScoringError::Configuration
/// [`Persistence`]: ScoringError::Persistence
#[derive(Debug, Error)]
pub enum ScoringError {
    /// A required input is absent for a security on the scoring date
    #[error("Missing data for {code} on {date}: {field}")]
    MissingData {
        /// Security code
        code: String,
        /// As-of date being scored
        date: NaiveDate,
        /// Name of the missing input
        field: String,
    },

    /// An industry partition is too small for rank or z-score statistics
    #[error("Insufficient peer group for {field} in {industry}: {size} member(s), need {required}")]
    InsufficientPeerGroup {
        /// Industry partition label
        industry: String,
        /// Normalized field name
        field: String,
        /// Members with a value in the partition
        size: usize,
        /// Configured minimum
        required: usize,
    },

    /// Malformed engine or strategy configuration
    #[error("Configuration error in {scope}: {reason}")]
    Configuration {
        /// Strategy code or config section
        scope: String,
        /// What is wrong
        reason: String,
    },

    /// The underlying store is unreachable or rejected a write
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The run was aborted between stages
    #[error("Run for {date} cancelled before {stage}")]
    Cancelled {
        /// As-of date of the aborted run
        date: NaiveDate,
        /// Stage that did not start
        stage: &'static str,
    },

    /// Invalid date range
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Start date of the range
        start: NaiveDate,
        /// End date of the range
        end: NaiveDate,
    },

    /// Polars DataFrame error
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

impl ScoringError {
    /// Shorthand for a [`ScoringError::Configuration`] error.
    pub fn config(scope: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            scope: scope.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`ScoringError::MissingData`] error.
    pub fn missing(code: impl Into<String>, date: NaiveDate, field: impl Into<String>) -> Self {
        Self::MissingData {
            code: code.into(),
            date,
            field: field.into(),
        }
    }

    /// Whether this error must abort the whole run.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::Cancelled { .. } | Self::Polars(_) | Self::Computation(_)
        )
    }
}
