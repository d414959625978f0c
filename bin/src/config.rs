//! Application configuration.
//!
//! Read from a JSON file, then overridden by `FD_SCORING_DB` and
//! `FD_SCORING_LOG_LEVEL`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fd_scoring::EngineConfig;
use serde::{Deserialize, Serialize};

/// Config file picked up from the working directory when `--config` is absent.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "fd-scoring.json";

/// Environment variable naming the database file.
pub(crate) const DB_ENV: &str = "FD_SCORING_DB";

/// Environment variable overriding the log level.
pub(crate) const LOG_LEVEL_ENV: &str = "FD_SCORING_LOG_LEVEL";

/// Everything the binary needs to start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    /// Engine settings
    pub(crate) engine: EngineConfig,
    /// SQLite database file
    pub(crate) database: PathBuf,
    /// Log output
    pub(crate) logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            database: PathBuf::from("fd-scoring.db"),
            logging: LoggingConfig::default(),
        }
    }
}

/// Log level and output format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct LoggingConfig {
    /// Base level directive
    pub(crate) level: String,
    /// `pretty` or `json`
    pub(crate) format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] when it exists, then
    /// apply environment overrides.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config
            .engine
            .validate()
            .context("invalid engine configuration")?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(db) = lookup(DB_ENV).filter(|v| !v.is_empty()) {
            self.database = PathBuf::from(db);
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|v| !v.is_empty()) {
            self.logging.level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_object_is_default() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_from_file_merges_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"database": "/tmp/scores.db", "engine": {{"parallel": false}}}}"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.database, PathBuf::from("/tmp/scores.db"));
        assert!(!config.engine.parallel);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| match key {
            DB_ENV => Some("/data/other.db".to_string()),
            LOG_LEVEL_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.database, PathBuf::from("/data/other.db"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load(Some(Path::new("/nonexistent/fd-scoring.json"))).is_err());
    }
}
