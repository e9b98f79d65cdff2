//! Technical analysis indicators used by the feature pipeline.
//!
//! Every function here works on a plain `&[f64]` series (or `highs`/`lows`/
//! `closes` triples) and returns a parallel `Vec<Option<f64>>`, `None` while
//! there isn't enough history to produce a value yet. This is the same
//! series-in, series-out convention used throughout: callers align indicator
//! output against the bar index it was computed from, never a separate
//! timestamp key.
//!
//! # Available Indicators
//!
//! - [`sma`] / [`ema`] — moving averages
//! - [`rsi`] — Wilder-smoothed Relative Strength Index
//! - [`atr`] — Average True Range (SMA-seeded, Wilder-smoothed)
//! - [`adx`] — Average Directional Index (Wilder-smoothed DI/DX)
//! - [`choppiness_index`] — Choppiness Index
//! - [`volume_sma`] / [`volume_ratio`] — volume confirmation indicators
//! - [`true_range`] — single-bar true range, used internally by `atr`/`adx`

mod adx;
mod atr;
mod choppiness_index;
mod ema;
mod rsi;
mod sma;
mod true_range;
mod volume;

pub use adx::adx;
pub use atr::atr;
pub use choppiness_index::choppiness_index;
pub use ema::ema;
pub use rsi::rsi;
pub use sma::sma;
pub use true_range::true_range;
pub use volume::{volume_ratio, volume_sma};

/// Error type for indicator calculations.
#[derive(Debug, thiserror::Error)]
pub enum IndicatorError {
    /// Not enough data points to calculate the indicator.
    #[error("Insufficient data: need at least {need} data points, got {got}")]
    InsufficientData {
        /// Minimum number of data points required.
        need: usize,
        /// Actual number of data points provided.
        got: usize,
    },

    /// Invalid period parameter provided.
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),
}

/// Result type for indicator calculations.
pub type Result<T> = std::result::Result<T, IndicatorError>;

/// Extract the last non-`None` value from a series.
///
/// # Example
///
/// ```
/// use backtest_engine::indicators::last_value;
///
/// let values = vec![None, None, Some(10.0), Some(20.0)];
/// assert_eq!(last_value(&values), Some(20.0));
/// ```
pub fn last_value(values: &[Option<f64>]) -> Option<f64> {
    values.iter().rev().find_map(|&v| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_value() {
        assert_eq!(last_value(&[None, None, Some(1.0), Some(2.0)]), Some(2.0));
        assert_eq!(last_value(&[None, None, Some(1.0), None]), Some(1.0));
        assert_eq!(last_value(&[None, None, None]), None);
        assert_eq!(last_value(&[]), None);
    }
}
