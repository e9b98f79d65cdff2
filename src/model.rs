//! Core data types shared across the replay engine: bars, funding events,
//! positions, trades, and the equity curve.

use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;

/// Position direction.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    /// Long position (profit when price rises).
    Long,
    /// Short position (profit when price falls).
    Short,
}

impl PositionSide {
    /// Sign multiplier: `1.0` for long, `-1.0` for short.
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    /// The opposite side.
    pub fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// A single OHLCV bar for one symbol at one interval.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open timestamp, milliseconds since epoch. `None` when the source
    /// schema only carried a single `timestamp` column (see `data::reader`).
    pub open_time: Option<i64>,
    /// Bar close timestamp, milliseconds since epoch. Bars are ordered by
    /// this field; it is the canonical index for replay and resampling.
    pub close_time: i64,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Base-asset volume traded during the bar.
    pub volume: f64,
    /// Tie-breaker for bars sharing a `close_time` from the same source.
    pub sequence: u64,
}

/// Interval a bar stream is sampled at.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    /// 4-hour bars, the entry-timing timeframe.
    FourHour,
    /// Daily bars, the trend-determination timeframe.
    Daily,
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FourHour => write!(f, "4h"),
            Self::Daily => write!(f, "1d"),
        }
    }
}

/// A funding settlement event for a perpetual contract.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FundingEvent {
    /// Settlement timestamp, milliseconds since epoch.
    pub timestamp: i64,
    /// Funding rate for this interval (e.g. `0.0001` = 1bp). Positive means
    /// longs pay shorts.
    pub rate: f64,
    /// Mark price used to compute the cashflow, when available. Falls back
    /// to the position's entry price when absent.
    pub mark_price: Option<f64>,
    /// Tie-breaker for events sharing a `timestamp` from the same source.
    pub sequence: u64,
}

/// A coarse news/event risk classification for a symbol at a point in time.
///
/// Used only as an optional dampening input to the risk engine and scoring
/// engine; this crate does not fetch or classify news itself.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewsRisk {
    /// No elevated news risk; full size and threshold apply.
    Low,
    /// Elevated but not disqualifying; soft size/threshold dampening applies.
    Medium,
    /// Disqualifying; the risk engine rejects the entry outright.
    High,
}

impl Default for NewsRisk {
    fn default() -> Self {
        Self::Low
    }
}

/// Exchange trading filters for a symbol, used to round order size and
/// enforce minimum notional.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymbolFilters {
    /// Smallest price increment.
    pub tick_size: f64,
    /// Smallest quantity increment.
    pub step_size: f64,
    /// Minimum order quantity.
    pub min_qty: f64,
    /// Minimum order notional (price * quantity).
    pub min_notional: f64,
    /// Maximum leverage the exchange allows for this symbol.
    pub max_leverage: f64,
}

impl Default for SymbolFilters {
    /// The fallback rule applied when a symbol is absent from the rule book.
    fn default() -> Self {
        Self {
            tick_size: 0.01,
            step_size: 0.001,
            min_qty: 0.001,
            min_notional: 5.0,
            max_leverage: 20.0,
        }
    }
}

/// An open leveraged position in a single symbol.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Unique id assigned at entry, carried through to the closed [`Trade`].
    pub trade_id: u64,
    /// Symbol this position is in.
    pub symbol: String,
    /// Position direction.
    pub side: PositionSide,
    /// Entry timestamp, milliseconds since epoch.
    pub entry_time: i64,
    /// Entry price (after simulated slippage).
    pub entry_price: f64,
    /// Position size in base-asset units.
    pub quantity: f64,
    /// Leverage applied at entry.
    pub leverage: f64,
    /// Entry commission paid, in quote currency.
    pub entry_commission: f64,
    /// Protective stop price set at entry.
    pub stop_price: f64,
    /// Optional take-profit price; absent when the strategy relies purely
    /// on the trailing-stop/time-stop exits.
    pub take_profit: Option<f64>,
    /// Net funding cashflow accumulated while the position has been open
    /// (negative values are a cost, positive values a credit).
    pub funding_accumulated: f64,
    /// Timestamp of the last funding settlement applied to this position,
    /// `None` until the first settlement after entry.
    pub last_funding_time: Option<i64>,
}

impl Position {
    /// Notional value of the position at `price`.
    pub fn notional(&self, price: f64) -> f64 {
        self.quantity * price
    }

    /// Unrealized P&L at `price`, before commission and funding.
    pub fn gross_unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.quantity * self.side.sign()
    }

    /// Unrealized P&L at `price`, including entry commission and funding
    /// accumulated so far, but not the (unknown) exit commission.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.gross_unrealized_pnl(price) - self.entry_commission + self.funding_accumulated
    }

    /// Apply a funding settlement cashflow to this position.
    pub fn apply_funding(&mut self, cashflow: f64, timestamp: i64) {
        self.funding_accumulated += cashflow;
        self.last_funding_time = Some(timestamp);
    }

    /// Close the position and produce the resulting [`Trade`].
    pub fn close(self, exit_time: i64, exit_price: f64, exit_commission: f64) -> Trade {
        let gross_pnl = self.gross_unrealized_pnl(exit_price);
        let total_commission = self.entry_commission + exit_commission;
        let pnl = gross_pnl - total_commission + self.funding_accumulated;
        let entry_notional = self.notional(self.entry_price);
        let return_pct = if entry_notional > 0.0 {
            (pnl / entry_notional) * self.leverage * 100.0
        } else {
            0.0
        };

        Trade {
            trade_id: self.trade_id,
            symbol: self.symbol,
            side: self.side,
            entry_time: self.entry_time,
            exit_time,
            entry_price: self.entry_price,
            exit_price,
            quantity: self.quantity,
            leverage: self.leverage,
            commission: total_commission,
            funding_pnl: self.funding_accumulated,
            pnl,
            return_pct,
        }
    }
}

/// A closed position.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Id carried over from the originating [`Position`].
    pub trade_id: u64,
    /// Symbol this trade was in.
    pub symbol: String,
    /// Trade direction.
    pub side: PositionSide,
    /// Entry timestamp, milliseconds since epoch.
    pub entry_time: i64,
    /// Exit timestamp, milliseconds since epoch.
    pub exit_time: i64,
    /// Entry price.
    pub entry_price: f64,
    /// Exit price.
    pub exit_price: f64,
    /// Position size in base-asset units.
    pub quantity: f64,
    /// Leverage applied.
    pub leverage: f64,
    /// Total commission (entry + exit), in quote currency.
    pub commission: f64,
    /// Net funding cashflow accumulated over the life of the trade.
    pub funding_pnl: f64,
    /// Realized P&L after commission and funding.
    pub pnl: f64,
    /// Return on margin, as a percentage.
    pub return_pct: f64,
}

impl Trade {
    /// Whether this trade was profitable.
    pub fn is_profitable(&self) -> bool {
        self.pnl > 0.0
    }

    /// Trade duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        self.exit_time - self.entry_time
    }
}

/// A candidate trade waiting on risk approval and portfolio selection.
///
/// Immutable once emitted by the signal generator; the risk engine and
/// portfolio selector only ever read it, never mutate it in place.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct TradeProposal {
    /// Unique id for this proposal, carried onto the [`Position`] if filled.
    pub trade_id: u64,
    /// Symbol the proposal is for.
    pub symbol: String,
    /// Proposed direction.
    pub side: PositionSide,
    /// Timestamp the proposal was generated at.
    pub created_at: i64,
    /// Reference price used to size and place the stop.
    pub entry_price: f64,
    /// Protective stop price.
    pub stop_price: f64,
    /// Optional take-profit price.
    pub take_profit: Option<f64>,
    /// ATR at proposal time, used by the risk engine's stop-width check.
    pub atr: f64,
    /// Requested leverage.
    pub leverage: f64,
    /// Composite score from the scoring engine, `[0.0, 1.0]`.
    pub composite_score: f64,
    /// Funding penalty component of the composite score, used as a
    /// portfolio-selection tiebreaker.
    pub funding_penalty: f64,
    /// Liquidity/volume-based score, used as a portfolio-selection tiebreaker.
    pub liquidity_score: f64,
    /// Funding rate in effect for this symbol at proposal time.
    pub funding_rate: f64,
    /// News-risk classification in effect at proposal time.
    pub news_risk: NewsRisk,
    /// `true` for a new entry, `false` for a reduce-only exit proposal.
    pub is_entry: bool,
}

/// Rolling drawdown/loss-streak bookkeeping the risk engine consults before
/// approving a new entry.
///
/// Owned exclusively by the [`crate::replay::ReplayLoop`]; nothing else
/// mutates it.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct TradingState {
    /// Total account equity.
    pub equity: f64,
    /// Highest equity observed so far, used for drawdown calculation.
    pub peak_equity: f64,
    /// Realized P&L so far in the current trading day (UTC).
    pub realized_pnl_today: f64,
    /// Number of consecutive losing trades just closed.
    pub consecutive_losses: u32,
    /// Timestamps (ms) of losing-trade closes within the rolling loss-streak window.
    pub loss_timestamps: Vec<i64>,
    /// Entries are blocked until this timestamp (ms), if set.
    pub cooldown_until: Option<i64>,
    /// Whether the active `cooldown_until` was set by the loss-streak rule
    /// (`true`) rather than the single-loss rule (`false`).
    pub cooldown_is_streak: bool,
    /// `true` once `MAX_DRAWDOWN` has tripped; permanent for the run.
    pub circuit_breaker_active: bool,
    /// Monotonically non-decreasing sequence number of the last applied event.
    pub last_event_sequence: u64,
}

impl TradingState {
    /// A fresh state for a run starting at `initial_equity`.
    pub fn new(initial_equity: f64) -> Self {
        Self {
            equity: initial_equity,
            peak_equity: initial_equity,
            realized_pnl_today: 0.0,
            consecutive_losses: 0,
            loss_timestamps: Vec::new(),
            cooldown_until: None,
            cooldown_is_streak: false,
            circuit_breaker_active: false,
            last_event_sequence: 0,
        }
    }

    /// Current drawdown from peak equity, as a percentage (`0.0` at the peak).
    pub fn drawdown_pct(&self) -> f64 {
        if self.peak_equity <= 0.0 {
            return 0.0;
        }
        ((self.peak_equity - self.equity) / self.peak_equity * 100.0).max(0.0)
    }

    /// Record a realized close: updates equity, peak equity, the daily P&L
    /// counter, the consecutive-loss/loss-timestamp bookkeeping, and starts a
    /// cooldown window on a losing close.
    pub fn record_close(&mut self, equity_delta: f64, net_pnl: f64, timestamp: i64, risk: &RiskConfig) {
        const ROLLING_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

        self.equity += equity_delta;
        self.peak_equity = self.peak_equity.max(self.equity);
        self.realized_pnl_today += net_pnl;
        if net_pnl < 0.0 {
            self.consecutive_losses += 1;
            self.loss_timestamps.push(timestamp);
            self.loss_timestamps.retain(|&t| timestamp - t <= ROLLING_WINDOW_MS);

            let is_streak = self.consecutive_losses >= risk.max_consecutive_losses;
            let cooldown_minutes = if is_streak {
                risk.cooldown_minutes_after_streak
            } else {
                risk.cooldown_minutes_after_loss
            };
            self.cooldown_until = Some(timestamp + (cooldown_minutes * 60_000.0) as i64);
            self.cooldown_is_streak = is_streak;
        } else {
            self.consecutive_losses = 0;
        }
    }

    /// Advance `last_event_sequence`, returning an invariant-violation error
    /// string if the caller's sequence would move it backwards.
    pub fn advance_sequence(&mut self, sequence: u64) -> Result<(), String> {
        if sequence < self.last_event_sequence {
            return Err(format!(
                "event sequence went backwards: {sequence} < {}",
                self.last_event_sequence
            ));
        }
        self.last_event_sequence = sequence;
        Ok(())
    }
}

/// One point on the equity curve.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityPoint {
    /// Timestamp, milliseconds since epoch.
    pub timestamp: i64,
    /// Total equity (cash + unrealized P&L across open positions).
    pub equity: f64,
    /// Drawdown fraction from peak equity at this point (`0.0` at the peak).
    pub drawdown_fraction: f64,
    /// Cash balance.
    pub cash: f64,
    /// Sum of unrealized P&L across all open positions.
    pub unrealized_pnl: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_position(side: PositionSide) -> Position {
        Position {
            trade_id: 1,
            symbol: "BTC-PERP".to_string(),
            side,
            entry_time: 1_000,
            entry_price: 100.0,
            quantity: 10.0,
            leverage: 5.0,
            entry_commission: 1.0,
            stop_price: 95.0,
            take_profit: None,
            funding_accumulated: 0.0,
            last_funding_time: None,
        }
    }

    #[test]
    fn test_long_unrealized_pnl() {
        let pos = make_position(PositionSide::Long);
        // (110 - 100) * 10 - 1 = 99
        assert!((pos.unrealized_pnl(110.0) - 99.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_unrealized_pnl() {
        let pos = make_position(PositionSide::Short);
        // (100 - 90) * 10 - 1 = 99
        assert!((pos.unrealized_pnl(90.0) - 99.0).abs() < 1e-9);
    }

    #[test]
    fn test_apply_funding_accumulates() {
        let mut pos = make_position(PositionSide::Long);
        pos.apply_funding(-2.5, 2_000);
        pos.apply_funding(-1.0, 3_000);
        assert!((pos.funding_accumulated - (-3.5)).abs() < 1e-9);
        assert_eq!(pos.last_funding_time, Some(3_000));
    }

    #[test]
    fn test_close_produces_trade_with_funding_included() {
        let mut pos = make_position(PositionSide::Long);
        pos.apply_funding(-3.0, 2_000);
        let trade = pos.close(5_000, 110.0, 1.0);
        // gross = (110-100)*10 = 100; - commission(2) + funding(-3) = 95
        assert!((trade.pnl - 95.0).abs() < 1e-9);
        assert!(trade.is_profitable());
        assert_eq!(trade.duration_ms(), 4_000);
    }

    #[test]
    fn test_losing_close_starts_single_loss_cooldown() {
        let risk = RiskConfig {
            max_consecutive_losses: 3,
            cooldown_minutes_after_loss: 60.0,
            cooldown_minutes_after_streak: 240.0,
            ..RiskConfig::default()
        };
        let mut state = TradingState::new(10_000.0);
        state.record_close(-100.0, -100.0, 1_000, &risk);
        assert_eq!(state.consecutive_losses, 1);
        assert!(!state.cooldown_is_streak);
        assert_eq!(state.cooldown_until, Some(1_000 + 60 * 60_000));
    }

    #[test]
    fn test_streak_of_losses_escalates_to_streak_cooldown() {
        let risk = RiskConfig {
            max_consecutive_losses: 2,
            cooldown_minutes_after_loss: 60.0,
            cooldown_minutes_after_streak: 240.0,
            ..RiskConfig::default()
        };
        let mut state = TradingState::new(10_000.0);
        state.record_close(-100.0, -100.0, 1_000, &risk);
        state.record_close(-50.0, -50.0, 2_000, &risk);
        assert_eq!(state.consecutive_losses, 2);
        assert!(state.cooldown_is_streak);
        assert_eq!(state.cooldown_until, Some(2_000 + 240 * 60_000));
    }

    #[test]
    fn test_winning_close_resets_consecutive_losses() {
        let risk = RiskConfig::default();
        let mut state = TradingState::new(10_000.0);
        state.record_close(-100.0, -100.0, 1_000, &risk);
        state.record_close(50.0, 50.0, 2_000, &risk);
        assert_eq!(state.consecutive_losses, 0);
    }
}
