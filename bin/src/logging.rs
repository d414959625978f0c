//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over the configured level when it is set.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, prelude::*};

use crate::config::LoggingConfig;

/// Noisy dependency targets capped at `warn`.
const QUIET_TARGETS: &[&str] = &["polars", "rusqlite"];

fn build_filter(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let mut directives = String::from(level);
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{target}=warn"));
    }
    EnvFilter::new(directives)
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub(crate) fn init(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(&config.level);
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.format == "json" {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_writer(std::io::stderr);
        registry.with(layer).try_init()
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_writer(std::io::stderr);
        registry.with(layer).try_init()
    };
    installed.map_err(|e| anyhow!("installing tracing subscriber: {e}"))?;

    tracing::debug!(level = %config.level, format = %config.format, "logging initialized");
    Ok(())
}
