//! Pre-trade risk gate: hard-cap-clamped limits checked against live account
//! state before a [`TradeProposal`](crate::model::TradeProposal) is allowed
//! to size and place an order.
//!
//! Every check the distilled specification calls for is evaluated and its
//! reason collected, even after a rejection reason has already fired — the
//! only early-return conditions are `CIRCUIT_BREAKER_ACTIVE` and
//! `MAX_DRAWDOWN`, which the spec calls out explicitly as short-circuiting.

use crate::config::RiskConfig;
use crate::model::{NewsRisk, TradeProposal, TradingState};
use crate::sizer::PositionSize;

/// Account minimum below which no new entry is permitted, regardless of
/// configuration.
const EQUITY_MINIMUM: f64 = 10.0;
/// Maximum stop distance, in ATRs, before a proposal's stop is considered too
/// wide to be a meaningful risk definition.
const MAX_STOP_ATR_MULTIPLE: f64 = 3.0;
/// Soft funding down-sizing multiplier.
const FUNDING_SOFT_MULTIPLIER: f64 = 0.75;
/// Soft news-risk down-sizing multiplier for `NewsRisk::Medium`.
const NEWS_MEDIUM_SIZE_MULTIPLIER: f64 = 0.5;
/// Soft news-risk score-threshold override for `NewsRisk::Medium`.
const NEWS_MEDIUM_ENTRY_THRESHOLD: f64 = 0.75;
/// Soft news-risk stop-multiplier override for `NewsRisk::Medium`.
const NEWS_MEDIUM_STOP_MULTIPLIER: f64 = 1.5;
/// Fraction of `max_leverage` beyond which projected margin usage is flagged.
const MARGIN_RATIO_LIMIT_FRACTION: f64 = 0.8;

/// Why a trade proposal was rejected, or down-sized but still approved.
///
/// Ordering here matches the distilled spec's evaluation order exactly, since
/// some tests assert on `reasons` contents in that order.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskRejectionReason {
    /// The circuit breaker is active; no new entries permitted until it resets. Fatal, early-return.
    CircuitBreakerActive,
    /// Equity has fallen below the absolute minimum ($10) required to trade at all.
    EquityBelowMinimum,
    /// Today's realized loss exceeds the configured cap.
    DailyLossLimit,
    /// Current drawdown from peak equity exceeds the configured cap. Fatal, early-return, trips the circuit breaker.
    MaxDrawdown,
    /// Opening this position would exceed `max_positions`.
    MaxPositionsReached,
    /// Requested leverage exceeds the configured cap.
    LeverageExceedsLimit,
    /// This symbol already has an open position.
    SymbolAlreadyOpen,
    /// This symbol already has a non-reduce-only entry order outstanding.
    OpenOrderExists,
    /// No stop price (or no usable ATR) was supplied with the proposal.
    StopLossMissing,
    /// The stop is further than `3` ATRs from entry.
    StopTooWide,
    /// Absolute funding rate exceeds the hard funding threshold.
    FundingTooHigh,
    /// News risk is classified `HIGH`.
    NewsHighRisk,
    /// This symbol is inside its post-loss cooldown window.
    CooldownAfterLoss,
    /// This symbol is inside its post-loss-streak cooldown window.
    CooldownAfterLossStreak,
    /// A previously-set cooldown is still active.
    CooldownActive,
    /// The sizer could not produce a quantity meeting `min_notional`/`min_qty`.
    SizeBelowMinNotional,
    /// Projected notional divided by equity exceeds `0.8 * max_leverage`.
    MarginRatioHigh,
}

impl std::fmt::Display for RiskRejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::CircuitBreakerActive => "circuit breaker active",
            Self::EquityBelowMinimum => "equity below minimum",
            Self::DailyLossLimit => "daily loss limit reached",
            Self::MaxDrawdown => "max drawdown exceeded",
            Self::MaxPositionsReached => "max open positions reached",
            Self::LeverageExceedsLimit => "leverage exceeds limit",
            Self::SymbolAlreadyOpen => "symbol already has an open position",
            Self::OpenOrderExists => "symbol already has an open order",
            Self::StopLossMissing => "stop loss missing or ATR unusable",
            Self::StopTooWide => "stop loss too wide relative to ATR",
            Self::FundingTooHigh => "funding rate too high",
            Self::NewsHighRisk => "news risk classified high",
            Self::CooldownAfterLoss => "symbol in post-loss cooldown",
            Self::CooldownAfterLossStreak => "symbol in post-loss-streak cooldown",
            Self::CooldownActive => "cooldown still active",
            Self::SizeBelowMinNotional => "order size below minimum notional",
            Self::MarginRatioHigh => "projected margin ratio too high",
        };
        write!(f, "{msg}")
    }
}

/// Outcome of a risk evaluation. Soft modifiers (`size_multiplier`,
/// `adjusted_entry_threshold`, `adjusted_stop_multiplier`) apply whether or
/// not the proposal was ultimately approved — a caller re-evaluating the
/// entry's score threshold against the adjustment does so independently of
/// approval.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct RiskCheckResult {
    /// Whether the proposal is approved (`reasons.is_empty()`).
    pub approved: bool,
    /// All fatal rejection reasons that applied, in evaluation order.
    pub reasons: Vec<RiskRejectionReason>,
    /// Multiplicative down-sizing applied by soft funding/news modifiers.
    pub size_multiplier: f64,
    /// Override for the signal generator's score threshold (news `MEDIUM`).
    pub adjusted_entry_threshold: Option<f64>,
    /// Override for the stop-placement ATR multiplier (news `MEDIUM`).
    pub adjusted_stop_multiplier: Option<f64>,
    /// Whether this evaluation newly tripped the circuit breaker.
    pub circuit_breaker: bool,
}

impl RiskCheckResult {
    fn early_return(reason: RiskRejectionReason, circuit_breaker: bool) -> Self {
        Self {
            approved: false,
            reasons: vec![reason],
            size_multiplier: 1.0,
            adjusted_entry_threshold: None,
            adjusted_stop_multiplier: None,
            circuit_breaker,
        }
    }
}

/// Which post-loss rule put a symbol into cooldown, determining which of the
/// two `COOLDOWN_AFTER_LOSS*` reasons is reported.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownKind {
    /// Cooldown started after a single losing close.
    AfterLoss,
    /// Cooldown started after `max_consecutive_losses` losses in a row.
    AfterLossStreak,
}

/// Live account/symbol state consulted by a risk evaluation. A thin,
/// read-only view the replay loop builds from [`TradingState`] plus
/// per-symbol position/order bookkeeping.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskState {
    /// Whether the circuit breaker is currently tripped.
    pub circuit_breaker_active: bool,
    /// Total account equity.
    pub equity: f64,
    /// Highest equity observed so far.
    pub peak_equity: f64,
    /// Realized loss so far in the current trading day, in quote currency.
    pub realized_pnl_today: f64,
    /// Number of currently open positions across the whole portfolio.
    pub open_positions: u32,
    /// Whether the proposal's own symbol already has an open position.
    pub symbol_already_open: bool,
    /// Whether the proposal's own symbol already has a non-reduce-only order out.
    pub open_order_exists: bool,
    /// Number of consecutive losing trades just prior to this proposal.
    pub consecutive_losses: u32,
    /// Cooldown deadline (ms), if one is active, and which rule set it.
    pub cooldown: Option<(i64, CooldownKind)>,
}

impl RiskState {
    /// Build the evaluation-time view from the replay loop's [`TradingState`]
    /// plus per-symbol flags it tracks separately.
    pub fn from_trading_state(
        state: &TradingState,
        open_positions: u32,
        symbol_already_open: bool,
        open_order_exists: bool,
        cooldown_kind: CooldownKind,
    ) -> Self {
        Self {
            circuit_breaker_active: state.circuit_breaker_active,
            equity: state.equity,
            peak_equity: state.peak_equity,
            realized_pnl_today: state.realized_pnl_today,
            open_positions,
            symbol_already_open,
            open_order_exists,
            consecutive_losses: state.consecutive_losses,
            cooldown: state.cooldown_until.map(|until| (until, cooldown_kind)),
        }
    }

    fn drawdown_pct(&self) -> f64 {
        if self.peak_equity <= 0.0 {
            return 0.0;
        }
        ((self.peak_equity - self.equity) / self.peak_equity * 100.0).max(0.0)
    }
}

/// Evaluates trade proposals against hard-cap-clamped risk limits.
pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    /// Build a risk engine. `config` is clamped to the account hard caps if
    /// it was not already (see [`RiskConfig::clamp_to_hard_caps`]).
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config: config.clamp_to_hard_caps(),
        }
    }

    /// Evaluate an entry proposal against current account/symbol state.
    ///
    /// `sizing` is the sizer's output for this proposal, when already
    /// computed; passing `None` skips `SIZE_BELOW_MIN_NOTIONAL`/
    /// `MARGIN_RATIO_HIGH` (the replay loop calls this twice: once before
    /// sizing to cheaply reject obviously-bad proposals, once after sizing to
    /// catch notional/margin issues).
    pub fn evaluate(
        &self,
        proposal: &TradeProposal,
        state: &RiskState,
        now: i64,
        sizing: Option<&PositionSize>,
    ) -> RiskCheckResult {
        if !proposal.is_entry {
            return RiskCheckResult {
                approved: true,
                reasons: Vec::new(),
                size_multiplier: 1.0,
                adjusted_entry_threshold: None,
                adjusted_stop_multiplier: None,
                circuit_breaker: false,
            };
        }

        if state.circuit_breaker_active {
            return RiskCheckResult::early_return(RiskRejectionReason::CircuitBreakerActive, false);
        }

        let mut reasons = Vec::new();

        if state.equity < EQUITY_MINIMUM {
            reasons.push(RiskRejectionReason::EquityBelowMinimum);
        }
        if state.realized_pnl_today <= -state.equity * self.config.max_daily_loss_pct / 100.0 {
            reasons.push(RiskRejectionReason::DailyLossLimit);
        }

        let drawdown_pct = state.drawdown_pct();
        if drawdown_pct >= self.config.max_drawdown_pct {
            let mut result = RiskCheckResult::early_return(RiskRejectionReason::MaxDrawdown, true);
            result.reasons = reasons.into_iter().chain([RiskRejectionReason::MaxDrawdown]).collect();
            return result;
        }

        if state.open_positions >= self.config.max_positions {
            reasons.push(RiskRejectionReason::MaxPositionsReached);
        }
        if proposal.leverage > self.config.max_leverage {
            reasons.push(RiskRejectionReason::LeverageExceedsLimit);
        }
        if state.symbol_already_open {
            reasons.push(RiskRejectionReason::SymbolAlreadyOpen);
        }
        if state.open_order_exists {
            reasons.push(RiskRejectionReason::OpenOrderExists);
        }

        if proposal.atr <= 0.0 {
            reasons.push(RiskRejectionReason::StopLossMissing);
        } else {
            let stop_distance_atr = (proposal.entry_price - proposal.stop_price).abs() / proposal.atr;
            if stop_distance_atr > MAX_STOP_ATR_MULTIPLE {
                reasons.push(RiskRejectionReason::StopTooWide);
            }
        }

        let mut size_multiplier = 1.0;
        let funding_pct = funding_percent(proposal.funding_rate);
        if funding_pct.abs() > self.config.funding_hard_pct {
            reasons.push(RiskRejectionReason::FundingTooHigh);
        } else if funding_pct.abs() > self.config.funding_soft_pct {
            size_multiplier *= FUNDING_SOFT_MULTIPLIER;
        }

        let mut adjusted_entry_threshold = None;
        let mut adjusted_stop_multiplier = None;
        match proposal.news_risk {
            NewsRisk::High => reasons.push(RiskRejectionReason::NewsHighRisk),
            NewsRisk::Medium => {
                size_multiplier *= NEWS_MEDIUM_SIZE_MULTIPLIER;
                adjusted_entry_threshold = Some(NEWS_MEDIUM_ENTRY_THRESHOLD);
                adjusted_stop_multiplier = Some(NEWS_MEDIUM_STOP_MULTIPLIER);
            }
            NewsRisk::Low => {}
        }

        if let Some((until, kind)) = state.cooldown {
            if now < until {
                reasons.push(match kind {
                    CooldownKind::AfterLoss => RiskRejectionReason::CooldownAfterLoss,
                    CooldownKind::AfterLossStreak => RiskRejectionReason::CooldownAfterLossStreak,
                });
            }
        }

        if let Some(sizing) = sizing {
            if sizing.below_min_notional {
                reasons.push(RiskRejectionReason::SizeBelowMinNotional);
            } else {
                let margin_ratio = sizing.notional / state.equity.max(f64::EPSILON);
                if margin_ratio > self.config.max_leverage * MARGIN_RATIO_LIMIT_FRACTION {
                    reasons.push(RiskRejectionReason::MarginRatioHigh);
                }
            }
        }

        RiskCheckResult {
            approved: reasons.is_empty(),
            reasons,
            size_multiplier,
            adjusted_entry_threshold,
            adjusted_stop_multiplier,
            circuit_breaker: false,
        }
    }
}

/// Converts a raw funding rate into a percent, guarding against a caller
/// accidentally passing an already-percent value: a rate with `|rate| <= 1`
/// is treated as a decimal fraction (`rate * 100`); anything larger is used
/// as-is.
fn funding_percent(rate: f64) -> f64 {
    if rate.abs() <= 1.0 {
        rate * 100.0
    } else {
        rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PositionSide;

    fn engine() -> RiskEngine {
        RiskEngine::new(RiskConfig {
            max_risk_pct: 0.5,
            max_leverage: 3.0,
            max_daily_loss_pct: 2.0,
            max_drawdown_pct: 8.0,
            max_positions: 1,
            max_consecutive_losses: 3,
            ..RiskConfig::default()
        })
    }

    fn proposal() -> TradeProposal {
        TradeProposal {
            trade_id: 1,
            symbol: "BTC-PERP".to_string(),
            side: PositionSide::Long,
            created_at: 0,
            entry_price: 100.0,
            stop_price: 98.0,
            take_profit: None,
            atr: 1.0,
            leverage: 2.0,
            composite_score: 0.8,
            funding_penalty: 1.0,
            liquidity_score: 1.0,
            funding_rate: 0.0001,
            news_risk: NewsRisk::Low,
            is_entry: true,
        }
    }

    fn state() -> RiskState {
        RiskState {
            equity: 10_000.0,
            peak_equity: 10_000.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_circuit_breaker_short_circuits() {
        let s = RiskState {
            circuit_breaker_active: true,
            ..state()
        };
        let result = engine().evaluate(&proposal(), &s, 0, None);
        assert!(!result.approved);
        assert_eq!(result.reasons, vec![RiskRejectionReason::CircuitBreakerActive]);
    }

    #[test]
    fn test_max_drawdown_short_circuits_and_trips_breaker() {
        let s = RiskState {
            equity: 9_000.0,
            peak_equity: 10_000.0, // 10% drawdown
            ..state()
        };
        let result = engine().evaluate(&proposal(), &s, 0, None);
        assert!(!result.approved);
        assert!(result.circuit_breaker);
        assert!(result.reasons.contains(&RiskRejectionReason::MaxDrawdown));
    }

    #[test]
    fn test_stop_too_wide_rejected() {
        let p = TradeProposal {
            stop_price: 90.0, // 10 atr away, atr=1.0
            ..proposal()
        };
        let result = engine().evaluate(&p, &state(), 0, None);
        assert!(result.reasons.contains(&RiskRejectionReason::StopTooWide));
    }

    #[test]
    fn test_funding_soft_downsize() {
        let p = TradeProposal {
            funding_rate: 0.0012, // 0.12%, between soft (0.1%) and hard (0.2%)
            ..proposal()
        };
        let result = engine().evaluate(&p, &state(), 0, None);
        assert!(result.approved);
        assert!((result.size_multiplier - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_funding_hard_rejects() {
        let p = TradeProposal {
            funding_rate: 0.003, // 0.3%, over hard threshold
            ..proposal()
        };
        let result = engine().evaluate(&p, &state(), 0, None);
        assert!(!result.approved);
        assert!(result.reasons.contains(&RiskRejectionReason::FundingTooHigh));
    }

    #[test]
    fn test_news_medium_soft_adjustments() {
        let p = TradeProposal {
            news_risk: NewsRisk::Medium,
            ..proposal()
        };
        let result = engine().evaluate(&p, &state(), 0, None);
        assert!((result.size_multiplier - 0.5).abs() < 1e-9);
        assert_eq!(result.adjusted_entry_threshold, Some(0.75));
        assert_eq!(result.adjusted_stop_multiplier, Some(1.5));
    }

    #[test]
    fn test_news_high_rejects() {
        let p = TradeProposal {
            news_risk: NewsRisk::High,
            ..proposal()
        };
        let result = engine().evaluate(&p, &state(), 0, None);
        assert!(!result.approved);
        assert!(result.reasons.contains(&RiskRejectionReason::NewsHighRisk));
    }

    #[test]
    fn test_symbol_already_open_and_open_order() {
        let s = RiskState {
            symbol_already_open: true,
            open_order_exists: true,
            ..state()
        };
        let result = engine().evaluate(&proposal(), &s, 0, None);
        assert!(result.reasons.contains(&RiskRejectionReason::SymbolAlreadyOpen));
        assert!(result.reasons.contains(&RiskRejectionReason::OpenOrderExists));
    }

    #[test]
    fn test_exit_proposal_bypasses_checks() {
        let p = TradeProposal {
            is_entry: false,
            ..proposal()
        };
        let s = RiskState {
            circuit_breaker_active: true,
            ..state()
        };
        let result = engine().evaluate(&p, &s, 0, None);
        assert!(result.approved);
    }

    #[test]
    fn test_size_below_min_notional_and_margin_ratio() {
        let below = PositionSize {
            quantity: 0.0,
            notional: 0.0,
            leverage: 0.0,
            below_min_notional: true,
        };
        let result = engine().evaluate(&proposal(), &state(), 0, Some(&below));
        assert!(result.reasons.contains(&RiskRejectionReason::SizeBelowMinNotional));

        let high_margin = PositionSize {
            quantity: 1_000.0,
            notional: 9_000.0, // 90% of 10k equity > 0.8*3.0 leverage fraction... see below
            leverage: 3.0,
            below_min_notional: false,
        };
        let result = engine().evaluate(&proposal(), &state(), 0, Some(&high_margin));
        assert!(result.reasons.contains(&RiskRejectionReason::MarginRatioHigh));
    }

    #[test]
    fn test_config_clamped_to_hard_caps_on_construction() {
        let loose = RiskConfig {
            max_risk_pct: 100.0,
            max_leverage: 100.0,
            max_daily_loss_pct: 100.0,
            max_drawdown_pct: 100.0,
            max_positions: 100,
            max_consecutive_losses: 100,
            ..RiskConfig::default()
        };
        let engine = RiskEngine::new(loose);
        let result = engine.evaluate(
            &TradeProposal { leverage: 10.0, ..proposal() },
            &state(),
            0,
            None,
        );
        assert!(!result.approved);
        assert!(result.reasons.contains(&RiskRejectionReason::LeverageExceedsLimit));
    }
}
