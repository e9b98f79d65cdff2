//! Feature pipeline: computes the indicator series the signal generator and
//! regime classifier need from raw bar history, in one pass per symbol.

use crate::indicators::{self, adx, atr, choppiness_index, ema, rsi, volume_ratio, volume_sma};
use crate::model::Bar;

/// Indicator series aligned index-for-index against the input bars.
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct FeatureSeries {
    /// Fast EMA of close.
    pub ema_fast: Vec<Option<f64>>,
    /// Slow EMA of close.
    pub ema_slow: Vec<Option<f64>>,
    /// Wilder RSI of close.
    pub rsi: Vec<Option<f64>>,
    /// Average True Range.
    pub atr: Vec<Option<f64>>,
    /// Average Directional Index.
    pub adx: Vec<Option<f64>>,
    /// Choppiness Index.
    pub chop: Vec<Option<f64>>,
    /// Volume simple moving average.
    pub volume_sma: Vec<Option<f64>>,
    /// Volume ratio (current / SMA).
    pub volume_ratio: Vec<Option<f64>>,
}

impl FeatureSeries {
    /// Snapshot of every indicator at bar index `i`. `None` fields mean the
    /// indicator had insufficient warmup at that index.
    pub fn at(&self, i: usize) -> FeatureSnapshot {
        FeatureSnapshot {
            ema_fast: self.ema_fast.get(i).copied().flatten(),
            ema_slow: self.ema_slow.get(i).copied().flatten(),
            rsi: self.rsi.get(i).copied().flatten(),
            atr: self.atr.get(i).copied().flatten(),
            adx: self.adx.get(i).copied().flatten(),
            chop: self.chop.get(i).copied().flatten(),
            volume_sma: self.volume_sma.get(i).copied().flatten(),
            volume_ratio: self.volume_ratio.get(i).copied().flatten(),
        }
    }
}

/// A single bar's worth of indicator values, with NaN-safe fallbacks applied.
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct FeatureSnapshot {
    /// Fast EMA of close.
    pub ema_fast: Option<f64>,
    /// Slow EMA of close.
    pub ema_slow: Option<f64>,
    /// Wilder RSI of close.
    pub rsi: Option<f64>,
    /// Average True Range.
    pub atr: Option<f64>,
    /// Average Directional Index.
    pub adx: Option<f64>,
    /// Choppiness Index.
    pub chop: Option<f64>,
    /// Volume simple moving average.
    pub volume_sma: Option<f64>,
    /// Volume ratio.
    pub volume_ratio: Option<f64>,
}

impl FeatureSnapshot {
    /// ADX with the classifier's documented fallback of `0.0` when undefined.
    pub fn adx_or_fallback(&self) -> f64 {
        self.adx.unwrap_or(0.0)
    }

    /// Choppiness Index with the classifier's documented fallback of `50.0`
    /// (neutral) when undefined.
    pub fn chop_or_fallback(&self) -> f64 {
        self.chop.unwrap_or(50.0)
    }
}

/// Configuration for computing a [`FeatureSeries`] from a bar history.
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Fast EMA period.
    pub ema_fast: usize,
    /// Slow EMA period.
    pub ema_slow: usize,
    /// RSI period.
    pub rsi_period: usize,
    /// ATR period.
    pub atr_period: usize,
    /// ADX period.
    pub adx_period: usize,
    /// Choppiness Index period.
    pub chop_period: usize,
    /// Volume SMA/ratio period.
    pub volume_period: usize,
}

/// Computes the full indicator set for a symbol's bar history.
///
/// Returns an error only when the history is too short for any configured
/// period; individual indicators that need more warmup than others simply
/// report `None` for their leading bars via [`FeatureSeries`].
pub fn compute(bars: &[Bar], config: &PipelineConfig) -> indicators::Result<FeatureSeries> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    Ok(FeatureSeries {
        ema_fast: ema(&closes, config.ema_fast),
        ema_slow: ema(&closes, config.ema_slow),
        rsi: rsi(&closes, config.rsi_period)?,
        atr: atr(&highs, &lows, &closes, config.atr_period)?,
        adx: adx(&highs, &lows, &closes, config.adx_period)?,
        chop: choppiness_index(&highs, &lows, &closes, config.chop_period)?,
        volume_sma: volume_sma(&volumes, config.volume_period),
        volume_ratio: volume_ratio(&volumes, config.volume_period),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let price = 100.0 + i as f64;
                Bar {
                    open_time: Some(i as i64 * 3_600_000),
                    close_time: i as i64 * 3_600_000 + 3_600_000,
                    open: price,
                    high: price + 1.0,
                    low: price - 1.0,
                    close: price,
                    volume: 1_000.0,
                    sequence: i as u64,
                }
            })
            .collect()
    }

    #[test]
    fn test_compute_produces_aligned_series() {
        let bars = make_bars(60);
        let config = PipelineConfig {
            ema_fast: 5,
            ema_slow: 10,
            rsi_period: 14,
            atr_period: 14,
            adx_period: 14,
            chop_period: 14,
            volume_period: 20,
        };
        let series = compute(&bars, &config).unwrap();
        assert_eq!(series.ema_fast.len(), bars.len());
        assert_eq!(series.rsi.len(), bars.len());
        let snap = series.at(59);
        assert!(snap.ema_fast.is_some());
        assert!(snap.rsi.is_some());
    }

    #[test]
    fn test_snapshot_fallbacks() {
        let snap = FeatureSnapshot {
            ema_fast: None,
            ema_slow: None,
            rsi: None,
            atr: None,
            adx: None,
            chop: None,
            volume_sma: None,
            volume_ratio: None,
        };
        assert_eq!(snap.adx_or_fallback(), 0.0);
        assert_eq!(snap.chop_or_fallback(), 50.0);
    }
}
