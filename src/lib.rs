//! # backtest-engine
//!
//! An event-driven backtesting engine for multi-symbol perpetual-futures
//! strategies: a heap-merged bar/funding event stream, regime-gated signal
//! generation with a no-lookahead daily/intraday split, a composite scoring
//! and cross-sectional portfolio selector, a risk engine with hard caps and
//! a circuit breaker, and pluggable execution simulation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use backtest_engine::config::BacktestRunConfig;
//! use backtest_engine::data;
//! use backtest_engine::ledger::BacktestLedger;
//! use backtest_engine::model::Interval;
//! use backtest_engine::replay::ReplayLoop;
//! use backtest_engine::rulebook::RuleBook;
//! use std::collections::HashMap;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BacktestRunConfig::builder()
//!     .symbols(["BTC-PERP"])
//!     .initial_equity(10_000.0)
//!     .build()?;
//!
//! let mut bars_by_symbol = HashMap::new();
//! bars_by_symbol.insert(
//!     "BTC-PERP".to_string(),
//!     data::read_bars("btc.csv", Interval::FourHour)?,
//! );
//!
//! let mut replay = ReplayLoop::new(
//!     config,
//!     bars_by_symbol,
//!     HashMap::new(),
//!     RuleBook::default(),
//!     BacktestLedger::null(),
//! )?;
//! let result = replay.run(HashMap::new())?;
//! println!("total return: {:.2}%", result.total_return);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Backtest run configuration: strategy, risk, execution, and funding blocks.
pub mod config;
/// CSV-based bar and funding history readers.
pub mod data;
/// Error types and result definitions.
pub mod error;
/// Order fill simulation models.
pub mod execution;
/// Perpetual-futures funding rate schedules and settlement accounting.
pub mod funding;
/// Technical analysis indicators used by the feature pipeline.
pub mod indicators;
/// Append-only JSON-lines audit ledger.
pub mod ledger;
/// Core domain types: bars, positions, trades, and trading state.
pub mod model;
/// Multi-symbol event multiplexer.
pub mod mux;
/// Grid-search and walk-forward parameter optimization.
#[cfg(feature = "optimizer")]
pub mod optimizer;
/// Indicator feature pipeline over a bar series.
pub mod pipeline;
/// Cross-symbol trade candidate selection under a shared position cap.
pub mod portfolio;
/// Trend/volatility regime classification.
pub mod regime;
/// The main replay loop orchestrating a full backtest.
pub mod replay;
/// Backtest result aggregation.
pub mod result;
/// Pre-trade and ongoing risk checks, circuit breaker, cooldowns.
pub mod risk_engine;
/// Per-symbol exchange filters, versioned by effective date.
pub mod rulebook;
/// Composite candidate scoring.
pub mod scoring;
/// Entry/exit signal generation with a no-lookahead daily/intraday split.
pub mod signal;
/// Risk-budget based position sizing.
pub mod sizer;

pub use config::BacktestRunConfig;
pub use error::{ReplayError, Result};
pub use replay::ReplayLoop;
pub use result::BacktestResult;
