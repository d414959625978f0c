//! SQLite storage for the scoring engine.
//!
//! [`SqliteStore`] implements [`FactorSource`](fd_scoring::FactorSource),
//! [`StrategySource`](fd_scoring::StrategySource) and
//! [`SnapshotSink`](fd_scoring::SnapshotSink) over one database file opened
//! in WAL mode, so a scoring run can read while collectors write.
//!
//! ```rust,ignore
//! use fd_scoring::{EngineConfig, RunContext, ScoringEngine};
//! use fd_scoring_sqlite::SqliteStore;
//!
//! let store = SqliteStore::open("scoring.db")?;
//! store.install_default_strategies()?;
//! let engine = ScoringEngine::new(EngineConfig::default())?;
//! engine.compute(&RunContext::new(as_of), &store, &store, &store)?;
//! ```

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod schema;
mod store;

pub use schema::SCHEMA_VERSION;
pub use store::SqliteStore;
