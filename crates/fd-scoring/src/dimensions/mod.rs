//! Built-in dimension scorers.
//!
//! Each dimension is a weighted set of [`Component`](crate::component::Component)s.
//! The default curves reproduce the scorecard tables the ratings were
//! originally calibrated on; any dimension can be replaced from
//! [`ScoringConfig`](crate::config::ScoringConfig).

pub mod cash_flow;
pub mod dividend;
pub mod growth;
pub mod operation;
pub mod profitability;
pub mod size_liquidity;
pub mod solvency;
pub mod valuation;

pub use cash_flow::CashFlow;
pub use dividend::Dividend;
pub use growth::Growth;
pub use operation::Operation;
pub use profitability::Profitability;
pub use size_liquidity::SizeLiquidity;
pub use solvency::Solvency;
pub use valuation::Valuation;
