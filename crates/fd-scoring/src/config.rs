//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! [`EngineConfig::validate`] is run once before any scoring happens.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    Result, ScoringError,
    component::Component,
    composite::{DimensionWeights, RatingScale},
    registry::Dimension,
};

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default composite weights
    pub weights: DimensionWeights,
    /// Rating cut points
    pub rating: RatingScale,
    /// Scoring curve overrides
    pub scoring: ScoringConfig,
    /// Point-in-time loading rules
    pub loader: LoaderConfig,
    /// Technical indicator windows
    pub technical: TechnicalConfig,
    /// Cross-sectional normalization
    pub normalizer: NormalizerConfig,
    /// Fan per-security work out across a thread pool
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: DimensionWeights::default(),
            rating: RatingScale::default(),
            scoring: ScoringConfig::default(),
            loader: LoaderConfig::default(),
            technical: TechnicalConfig::default(),
            normalizer: NormalizerConfig::default(),
            parallel: true,
        }
    }
}

impl EngineConfig {
    /// Check the whole configuration for internal consistency.
    pub fn validate(&self) -> Result<()> {
        self.weights.validate("engine.weights")?;
        self.rating.validate()?;
        self.scoring.validate()?;
        self.loader.validate()?;
        self.technical.validate()?;
        self.normalizer.validate()?;

        let required = self.technical.required_lookback_days();
        if u64::from(self.loader.lookback_days) < required {
            return Err(ScoringError::config(
                "engine.loader",
                format!(
                    "lookback_days {} cannot cover a {}-bar window; need at least {required}",
                    self.loader.lookback_days,
                    self.technical.longest_window()
                ),
            ));
        }
        Ok(())
    }
}

/// Statutory disclosure deadlines, in days after period end.
///
/// Used as the effective publication date of an observation whose
/// publication date was not collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicationLag {
    /// First quarter report
    pub q1: u32,
    /// Half-year report
    pub q2: u32,
    /// Third quarter report
    pub q3: u32,
    /// Annual report
    pub q4: u32,
}

impl Default for PublicationLag {
    fn default() -> Self {
        Self {
            q1: 30,
            q2: 62,
            q3: 31,
            q4: 120,
        }
    }
}

impl PublicationLag {
    /// Lag for a quarter; out-of-range quarters get the annual lag.
    pub const fn days_for(&self, quarter: u8) -> u32 {
        match quarter {
            1 => self.q1,
            2 => self.q2,
            3 => self.q3,
            _ => self.q4,
        }
    }
}

/// Point-in-time loading rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Calendar days of daily history read before the as-of date
    pub lookback_days: u32,
    /// Fallback publication lags
    pub publication_lag: PublicationLag,
    /// Trailing window for dividend yield, in calendar days
    pub dividend_window_days: u32,
    /// Number of calendar years counted for `dividend_years`
    pub dividend_years_span: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            lookback_days: 420,
            publication_lag: PublicationLag::default(),
            dividend_window_days: 365,
            dividend_years_span: 3,
        }
    }
}

impl LoaderConfig {
    fn validate(&self) -> Result<()> {
        if self.lookback_days == 0 {
            return Err(ScoringError::config("engine.loader", "lookback_days must be positive"));
        }
        if self.dividend_window_days == 0 || self.dividend_years_span == 0 {
            return Err(ScoringError::config(
                "engine.loader",
                "dividend windows must be positive",
            ));
        }
        Ok(())
    }
}

/// Technical indicator windows, in trading days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnicalConfig {
    /// Short moving average
    pub ma_short: usize,
    /// Medium moving average
    pub ma_mid: usize,
    /// Long moving average
    pub ma_long: usize,
    /// Window for average traded amount
    pub amount_window: usize,
    /// Trailing window for the P/B percentile threshold
    pub percentile_window: usize,
    /// Quantile of trailing P/B used as the "cheap" threshold
    pub percentile_quantile: f64,
}

impl Default for TechnicalConfig {
    fn default() -> Self {
        Self {
            ma_short: 60,
            ma_mid: 120,
            ma_long: 250,
            amount_window: 20,
            percentile_window: 250,
            percentile_quantile: 0.2,
        }
    }
}

impl TechnicalConfig {
    /// Longest trailing window, in bars.
    pub fn longest_window(&self) -> usize {
        [
            self.ma_short,
            self.ma_mid,
            self.ma_long,
            self.amount_window,
            self.percentile_window,
        ]
        .into_iter()
        .max()
        .unwrap_or_default()
    }

    /// Calendar days holding [`Self::longest_window`] weekday bars.
    pub fn required_lookback_days(&self) -> u64 {
        (self.longest_window() as u64 * 7).div_ceil(5)
    }

    fn validate(&self) -> Result<()> {
        let windows = [
            self.ma_short,
            self.ma_mid,
            self.ma_long,
            self.amount_window,
            self.percentile_window,
        ];
        if windows.contains(&0) {
            return Err(ScoringError::config("engine.technical", "windows must be positive"));
        }
        if !(self.percentile_quantile > 0.0 && self.percentile_quantile < 1.0) {
            return Err(ScoringError::config(
                "engine.technical",
                format!("percentile_quantile {} not in (0, 1)", self.percentile_quantile),
            ));
        }
        Ok(())
    }
}

/// Which normalized input feeds the industry-neutral composite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeutralBasis {
    /// Within-industry rank percentile, 0 (worst) to 100 (best)
    #[default]
    Rank,
    /// Within-industry z-score mapped to `50 + scale * z`, clipped to [0, 100]
    Zscore,
}

/// Cross-sectional normalization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Smallest industry partition that gets ranks and z-scores
    pub min_peer_group: usize,
    /// Input used for the industry-neutral composite
    pub neutral_basis: NeutralBasis,
    /// Points per standard deviation when mapping z-scores to [0, 100]
    pub zscore_scale: f64,
    /// Standard deviations at or below this count as zero variance
    pub zero_variance_epsilon: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_peer_group: 2,
            neutral_basis: NeutralBasis::Rank,
            zscore_scale: 15.0,
            zero_variance_epsilon: 1e-12,
        }
    }
}

impl NormalizerConfig {
    fn validate(&self) -> Result<()> {
        if self.min_peer_group < 2 {
            return Err(ScoringError::config(
                "engine.normalizer",
                "min_peer_group must be at least 2",
            ));
        }
        if !(self.zscore_scale.is_finite() && self.zscore_scale > 0.0) {
            return Err(ScoringError::config("engine.normalizer", "zscore_scale must be positive"));
        }
        if !(self.zero_variance_epsilon.is_finite() && self.zero_variance_epsilon >= 0.0) {
            return Err(ScoringError::config(
                "engine.normalizer",
                "zero_variance_epsilon must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Per-dimension component overrides.
///
/// A dimension listed here replaces its built-in components entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Replacement components keyed by dimension
    pub overrides: BTreeMap<Dimension, Vec<Component>>,
}

impl ScoringConfig {
    fn validate(&self) -> Result<()> {
        for (dimension, components) in &self.overrides {
            let scope = format!("engine.scoring.{}", dimension.as_str());
            if components.is_empty() {
                return Err(ScoringError::config(scope, "at least one component is required"));
            }
            for component in components {
                component.validate(&scope)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_json_override() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"normalizer": {"min_peer_group": 5}, "parallel": false}"#)
                .unwrap();
        assert_eq!(config.normalizer.min_peer_group, 5);
        assert_eq!(config.normalizer.zscore_scale, 15.0);
        assert!(!config.parallel);
    }

    #[test]
    fn test_invalid_quantile_rejected() {
        let mut config = EngineConfig::default();
        config.technical.percentile_quantile = 1.5;
        assert!(matches!(config.validate(), Err(ScoringError::Configuration { .. })));
    }

    #[test]
    fn test_lookback_must_cover_longest_window() {
        let mut config = EngineConfig::default();
        assert_eq!(config.technical.required_lookback_days(), 350);

        config.loader.lookback_days = 200;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ScoringError::Configuration { ref scope, .. } if scope == "engine.loader"));

        config.loader.lookback_days = 350;
        config.validate().unwrap();

        config.technical.percentile_window = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_peer_group_floor() {
        let mut config = EngineConfig::default();
        config.normalizer.min_peer_group = 1;
        assert!(config.validate().is_err());
    }
}
