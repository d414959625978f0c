#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/scoring/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod component;
pub mod composite;
pub mod config;
pub mod curve;
pub mod dimensions;
pub mod error;
pub mod loader;
pub mod memory;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod registry;
pub mod screener;
pub mod snapshot;
pub mod source;
pub mod standardize;
pub mod strategy;
pub mod technical;
pub mod traits;

// Re-export core types
pub use composite::{CompositeAggregator, CompositeScore, DimensionWeights, Rating, RatingScale};
pub use config::EngineConfig;
pub use error::{Result, ScoringError};
pub use loader::{FactorLoader, FactorSnapshot};
pub use memory::MemoryStore;
pub use normalize::{NormalizedScores, Normalizer, PeerField};
pub use pipeline::{RunContext, RunReport, ScoringEngine};
pub use registry::{Dimension, DimensionScores, ScoredSecurity, ScorerInfo, ScorerRegistry};
pub use screener::StrategyScreener;
pub use snapshot::{SnapshotBatch, SnapshotSink};
pub use source::{FactorSource, LoadWindow, StrategySource};
pub use strategy::{StrategyConfig, StrategyRecord};
pub use traits::{ConfigurableScorer, DataFrequency, DimensionConfig, DimensionScorer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
