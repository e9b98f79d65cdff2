//! Signal generator: turns aligned daily/4h indicator snapshots into entry
//! and exit signals, with a strict no-lookahead guarantee — every signal at
//! 4h bar index `i` only ever reads daily data whose bar closed at or before
//! that 4h bar's close.

use crate::config::{EntryConfig, ExitConfig};
use crate::model::{Bar, Position, PositionSide};
use crate::pipeline::{FeatureSeries, FeatureSnapshot};

pub(crate) const MS_PER_DAY: i64 = 86_400_000;

/// Directional bias read off the daily frame.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Uptrend,
    Downtrend,
    NoTrend,
}

/// Which setup produced an entry signal.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStyle {
    /// Shallow retracement into an established trend.
    Pullback,
    /// Continuation through a recent range extreme.
    Breakout,
}

/// Why an exit signal fired.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The daily trend flipped against the open position's side.
    TrendInvalidation,
    /// The position has been held past `time_stop_days` without reaching
    /// `time_stop_min_profit_atr` of profit.
    TimeStop,
}

/// An entry signal: a candidate direction, reference price, and the stop
/// distance it implies. Not yet sized, scored, or risk-checked.
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct EntrySignal {
    pub side: PositionSide,
    pub style: EntryStyle,
    pub price: f64,
    pub atr: f64,
    pub stop_price: f64,
}

/// An exit signal for an already-open position.
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct ExitSignal {
    pub reason: ExitReason,
    pub price: f64,
}

/// Determine the daily trend at daily-frame index `idx`.
///
/// Requires all three conjuncts the daily close and EMA pair imply: the fast
/// EMA on the correct side of the slow EMA, price confirming on the same
/// side of the slow EMA, and the fast EMA actually sloping that way over the
/// last 3 daily bars (`idx - 3`). Dropping any one of the three lets a
/// momentary EMA cross or a single wicking bar count as a trend.
pub fn determine_trend(daily_bars: &[Bar], daily_features: &FeatureSeries, idx: usize) -> Trend {
    let Some(bar) = daily_bars.get(idx) else {
        return Trend::NoTrend;
    };
    let feat = daily_features.at(idx);
    let (Some(fast), Some(slow)) = (feat.ema_fast, feat.ema_slow) else {
        return Trend::NoTrend;
    };
    let prev_fast = if idx >= 3 {
        daily_features
            .ema_fast
            .get(idx - 3)
            .copied()
            .flatten()
            .unwrap_or(fast)
    } else {
        fast
    };
    let price = bar.close;

    if fast > slow && price > slow && fast > prev_fast {
        Trend::Uptrend
    } else if fast < slow && price < slow && fast < prev_fast {
        Trend::Downtrend
    } else {
        Trend::NoTrend
    }
}

/// Resample a 4h bar history into daily bars with no lookahead.
///
/// A bar's day is keyed off `close_time - 1`, not `close_time`: a bar that
/// closes exactly at a UTC midnight boundary belongs to the day that just
/// ended, not the one about to start. Shifting back one millisecond before
/// bucketing and leaving the bucket's own timestamps untouched keeps every
/// 4h bar attributed to the daily candle it actually completed within.
pub fn resample_daily(bars: &[Bar]) -> Vec<Bar> {
    let mut out: Vec<Bar> = Vec::new();
    for bar in bars {
        let bucket = (bar.close_time - 1).div_euclid(MS_PER_DAY);
        match out.last_mut() {
            Some(last) if (last.close_time - 1).div_euclid(MS_PER_DAY) == bucket => {
                last.high = last.high.max(bar.high);
                last.low = last.low.min(bar.low);
                last.close = bar.close;
                last.close_time = bar.close_time;
                last.volume += bar.volume;
                last.sequence = bar.sequence;
            }
            _ => out.push(Bar {
                open_time: bar.open_time,
                close_time: bar.close_time,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                sequence: bar.sequence,
            }),
        }
    }
    out
}

/// For each 4h bar index, the index into the daily series of the most recent
/// daily bar that had *fully closed* by that 4h bar's close — never the daily
/// bar still in progress. `None` before any daily bar has closed.
pub fn align_daily_to_intraday(intraday: &[Bar], daily: &[Bar]) -> Vec<Option<usize>> {
    let mut out = Vec::with_capacity(intraday.len());
    let mut daily_idx = 0usize;
    for bar in intraday {
        while daily_idx < daily.len() && daily[daily_idx].close_time <= bar.close_time {
            daily_idx += 1;
        }
        out.push(daily_idx.checked_sub(1));
    }
    out
}

/// Evaluates entry setups on the 4h frame, given the daily trend already in
/// effect.
pub struct SignalGenerator {
    config: EntryConfig,
    atr_stop_multiplier: f64,
}

impl SignalGenerator {
    pub fn new(config: EntryConfig, exit_config: ExitConfig) -> Self {
        Self {
            config,
            atr_stop_multiplier: exit_config.atr_stop_multiplier,
        }
    }

    /// Look for an entry at 4h bar index `i`, given the daily trend and the
    /// full 4h bar/feature history up to and including `i`.
    pub fn entry_at(
        &self,
        bars: &[Bar],
        features: &FeatureSeries,
        i: usize,
        trend: Trend,
    ) -> Option<EntrySignal> {
        let feat = features.at(i);
        let atr = feat.atr?;
        if atr <= 0.0 {
            return None;
        }
        bars.get(i)?;

        if self.config.require_volume_confirmation {
            let ratio = feat.volume_ratio.unwrap_or(0.0);
            if ratio < self.config.volume_ratio_threshold {
                return None;
            }
        }

        match trend {
            Trend::Uptrend => self
                .pullback_long(bars, features, i, atr)
                .or_else(|| self.breakout_long(bars, &feat, i, atr)),
            Trend::Downtrend => self
                .pullback_short(bars, features, i, atr)
                .or_else(|| self.breakout_short(bars, &feat, i, atr)),
            Trend::NoTrend => None,
        }
    }

    /// A long entry requires the *previous* bar to have pulled back at or
    /// below the slow EMA, the current bar to have recovered back above the
    /// fast EMA, and RSI to confirm the recovery isn't still oversold.
    fn pullback_long(
        &self,
        bars: &[Bar],
        features: &FeatureSeries,
        i: usize,
        atr: f64,
    ) -> Option<EntrySignal> {
        let feat = features.at(i);
        let rsi = feat.rsi?;
        let ema_fast = feat.ema_fast?;
        let bar = bars.get(i)?;

        let (prev_close, prev_ema_slow) = if i == 0 {
            (bar.close, feat.ema_slow?)
        } else {
            let prev_bar = bars.get(i - 1)?;
            (prev_bar.close, features.at(i - 1).ema_slow?)
        };

        let pulled_back = prev_close <= prev_ema_slow;
        let recovered = bar.close > ema_fast;
        if pulled_back && recovered && rsi > self.config.rsi_oversold {
            return Some(EntrySignal {
                side: PositionSide::Long,
                style: EntryStyle::Pullback,
                price: bar.close,
                atr,
                stop_price: bar.close - self.atr_stop_multiplier * atr,
            });
        }
        None
    }

    /// Mirror of [`Self::pullback_long`] for downtrends.
    fn pullback_short(
        &self,
        bars: &[Bar],
        features: &FeatureSeries,
        i: usize,
        atr: f64,
    ) -> Option<EntrySignal> {
        let feat = features.at(i);
        let rsi = feat.rsi?;
        let ema_fast = feat.ema_fast?;
        let bar = bars.get(i)?;

        let (prev_close, prev_ema_slow) = if i == 0 {
            (bar.close, feat.ema_slow?)
        } else {
            let prev_bar = bars.get(i - 1)?;
            (prev_bar.close, features.at(i - 1).ema_slow?)
        };

        let pulled_back = prev_close >= prev_ema_slow;
        let recovered = bar.close < ema_fast;
        if pulled_back && recovered && rsi < self.config.rsi_overbought {
            return Some(EntrySignal {
                side: PositionSide::Short,
                style: EntryStyle::Pullback,
                price: bar.close,
                atr,
                stop_price: bar.close + self.atr_stop_multiplier * atr,
            });
        }
        None
    }

    fn breakout_long(
        &self,
        bars: &[Bar],
        feat: &FeatureSnapshot,
        i: usize,
        atr: f64,
    ) -> Option<EntrySignal> {
        let lookback = self.config.breakout_lookback;
        if i < lookback {
            return None;
        }
        let window = &bars[i - lookback..i];
        let prior_high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let close = bars[i].close;
        if close <= prior_high {
            return None;
        }
        let extension = (close - prior_high) / atr;
        if extension > self.config.max_extension_atr {
            return None;
        }
        let _ = feat;
        Some(EntrySignal {
            side: PositionSide::Long,
            style: EntryStyle::Breakout,
            price: close,
            atr,
            stop_price: prior_high - self.atr_stop_multiplier * atr,
        })
    }

    fn breakout_short(
        &self,
        bars: &[Bar],
        feat: &FeatureSnapshot,
        i: usize,
        atr: f64,
    ) -> Option<EntrySignal> {
        let lookback = self.config.breakout_lookback;
        if i < lookback {
            return None;
        }
        let window = &bars[i - lookback..i];
        let prior_low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let close = bars[i].close;
        if close >= prior_low {
            return None;
        }
        let extension = (prior_low - close) / atr;
        if extension > self.config.max_extension_atr {
            return None;
        }
        let _ = feat;
        Some(EntrySignal {
            side: PositionSide::Short,
            style: EntryStyle::Breakout,
            price: close,
            atr,
            stop_price: prior_low + self.atr_stop_multiplier * atr,
        })
    }
}

/// Check an open position for a trend-invalidation or time-stop exit.
///
/// `time_stop_days`/`time_stop_min_profit_atr` come from [`crate::config::ExitConfig`];
/// threading the whole config through would pull in an unrelated dependency
/// for two scalars, so callers pass them directly.
pub fn check_exit(
    position: &Position,
    trend: Trend,
    now: i64,
    current_price: f64,
    atr: f64,
    time_stop_days: i64,
    time_stop_min_profit_atr: f64,
) -> Option<ExitSignal> {
    let trend_against = match (position.side, trend) {
        (PositionSide::Long, Trend::Downtrend) => true,
        (PositionSide::Short, Trend::Uptrend) => true,
        _ => false,
    };
    if trend_against {
        return Some(ExitSignal {
            reason: ExitReason::TrendInvalidation,
            price: current_price,
        });
    }

    let held_ms = now - position.entry_time;
    if held_ms >= time_stop_days * MS_PER_DAY && atr > 0.0 {
        let profit_atr = position.gross_unrealized_pnl(current_price) / (position.quantity * atr);
        if profit_atr < time_stop_min_profit_atr {
            return Some(ExitSignal {
                reason: ExitReason::TimeStop,
                price: current_price,
            });
        }
    }

    None
}
