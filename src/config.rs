//! Configuration blocks for every tunable subsystem, each with a fluent
//! builder and a `validate()` that clamps/rejects out-of-range values before
//! a replay starts.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

type Result<T> = std::result::Result<T, ConfigError>;

/// Entry-signal parameters (pullback and breakout setups).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Fast EMA period used for trend determination.
    pub ema_fast: usize,
    /// Slow EMA period used for trend determination.
    pub ema_slow: usize,
    /// RSI period.
    pub rsi_period: usize,
    /// RSI floor the recovery bar must clear for a pullback-in-uptrend entry
    /// (confirms the bounce isn't still oversold momentum).
    pub rsi_oversold: f64,
    /// RSI ceiling the recovery bar must stay under for a pullback-in-downtrend
    /// entry (confirms the bounce isn't still overbought momentum).
    pub rsi_overbought: f64,
    /// Lookback window for breakout high/low.
    pub breakout_lookback: usize,
    /// Maximum extension beyond the breakout level, in ATRs, before an entry is rejected as chased.
    pub max_extension_atr: f64,
    /// Require current-bar volume to exceed `volume_ratio_threshold` times the mean of the prior 3 bars.
    pub require_volume_confirmation: bool,
    /// Minimum volume ratio for confirmation when `require_volume_confirmation` is set.
    pub volume_ratio_threshold: f64,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            ema_fast: 20,
            ema_slow: 50,
            rsi_period: 14,
            rsi_oversold: 40.0,
            rsi_overbought: 60.0,
            breakout_lookback: 20,
            max_extension_atr: 1.5,
            require_volume_confirmation: true,
            volume_ratio_threshold: 1.2,
        }
    }
}

/// Exit-signal parameters.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExitConfig {
    /// Stop-loss distance, in ATRs, from the entry price.
    pub atr_stop_multiplier: f64,
    /// Maximum number of days a position may be held without reaching
    /// `time_stop_min_profit_atr` of profit before it is force-closed.
    pub time_stop_days: i64,
    /// Minimum profit, in ATRs, required to avoid the time stop.
    pub time_stop_min_profit_atr: f64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            atr_stop_multiplier: 2.0,
            time_stop_days: 10,
            time_stop_min_profit_atr: 1.0,
        }
    }
}

/// Composite-score factor weights and thresholds.
///
/// Weights need not sum to exactly `1.0`; [`validate`](ScoringConfig::validate)
/// only rejects negative weights.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight of the trend-alignment factor.
    pub weight_trend: f64,
    /// Weight of the volatility-regime factor.
    pub weight_volatility: f64,
    /// Weight of the entry-quality factor.
    pub weight_entry_quality: f64,
    /// Weight of the funding-cost penalty factor.
    pub weight_funding: f64,
    /// Weight of the news-risk dampening factor.
    pub weight_news: f64,
    /// Minimum composite score required for a candidate to be eligible.
    pub min_composite_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weight_trend: 0.35,
            weight_volatility: 0.15,
            weight_entry_quality: 0.25,
            weight_funding: 0.10,
            weight_news: 0.15,
            min_composite_score: 0.5,
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("weight_trend", self.weight_trend),
            ("weight_volatility", self.weight_volatility),
            ("weight_entry_quality", self.weight_entry_quality),
            ("weight_funding", self.weight_funding),
            ("weight_news", self.weight_news),
        ] {
            if w < 0.0 {
                return Err(ConfigError::invalid(name, "weight must not be negative"));
            }
        }
        if !(0.0..=1.0).contains(&self.min_composite_score) {
            return Err(ConfigError::invalid(
                "min_composite_score",
                "must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Regime-classification thresholds.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// ADX at/above this is considered trending (with CHOP confirmation).
    pub adx_trending_threshold: f64,
    /// ADX at/below this alone is considered choppy.
    pub adx_choppy_threshold: f64,
    /// Choppiness Index below this confirms a trending regime.
    pub chop_trending_threshold: f64,
    /// Choppiness Index at/above this alone is considered choppy.
    pub chop_choppy_threshold: f64,
    /// Entry size multiplier applied in the `TRANSITIONAL` regime.
    pub transitional_multiplier: f64,
    /// ATR% ratio (current / rolling average) above this is a high-volatility sub-regime.
    pub volatility_high_ratio: f64,
    /// ATR% ratio below this is a low-volatility sub-regime.
    pub volatility_low_ratio: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            adx_trending_threshold: 25.0,
            adx_choppy_threshold: 15.0,
            chop_trending_threshold: 38.2,
            chop_choppy_threshold: 61.8,
            transitional_multiplier: 0.5,
            volatility_high_ratio: 1.5,
            volatility_low_ratio: 0.5,
        }
    }
}

/// Feature-pipeline indicator periods, shared by the signal generator and
/// regime classifier.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// ATR period.
    pub atr_period: usize,
    /// ADX period.
    pub adx_period: usize,
    /// Choppiness Index period.
    pub chop_period: usize,
    /// Volume SMA/ratio period.
    pub volume_period: usize,
    /// Rolling window used to compute the ATR% baseline for volatility sub-regime.
    pub atr_pct_baseline_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            adx_period: 14,
            chop_period: 14,
            volume_period: 20,
            atr_pct_baseline_period: 50,
        }
    }
}

/// Strategy-level configuration: the union of entry, exit, scoring, and
/// indicator settings.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Entry-signal parameters.
    pub entry: EntryConfig,
    /// Exit-signal parameters.
    pub exit: ExitConfig,
    /// Composite-score weights.
    pub scoring: ScoringConfig,
    /// Regime-classification thresholds.
    pub regime: RegimeConfig,
    /// Indicator periods.
    pub indicators: IndicatorConfig,
}

impl StrategyConfig {
    /// Validate this block, returning the first violation found.
    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()?;
        if self.entry.ema_fast >= self.entry.ema_slow {
            return Err(ConfigError::invalid(
                "ema_fast",
                "must be smaller than ema_slow",
            ));
        }
        if self.exit.atr_stop_multiplier <= 0.0 {
            return Err(ConfigError::invalid(
                "atr_stop_multiplier",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Hard risk caps the engine will never clamp past, regardless of what a
/// [`RiskConfig`] requests. Mirrors the exchange's own account-level limits.
struct HardCaps;
impl HardCaps {
    const MAX_RISK_PCT: f64 = 1.0;
    const MAX_LEVERAGE: f64 = 5.0;
    const MAX_DAILY_LOSS_PCT: f64 = 3.0;
    const MAX_DRAWDOWN_PCT: f64 = 10.0;
    const MAX_POSITIONS: u32 = 1;
    const MAX_CONSECUTIVE_LOSSES: u32 = 3;
}

/// Risk-engine limits.
///
/// Values supplied here are clamped to never exceed the account-level hard
/// caps (see [`RiskConfig::clamp_to_hard_caps`]); the builder applies the
/// clamp automatically so a caller can only ever request a tighter-or-equal
/// limit, never a looser one.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Maximum fraction of equity risked on a single position, as a percent
    /// (`0.5` = 0.5%).
    pub max_risk_pct: f64,
    /// Maximum leverage allowed on any position.
    pub max_leverage: f64,
    /// Maximum fraction of equity that may be lost in a single day before trading halts.
    pub max_daily_loss_pct: f64,
    /// Maximum drawdown from peak equity before the circuit breaker trips.
    pub max_drawdown_pct: f64,
    /// Maximum number of concurrently open positions across the whole portfolio.
    pub max_positions: u32,
    /// Number of consecutive losing trades that trips the loss-streak cooldown.
    pub max_consecutive_losses: u32,
    /// Minutes a symbol is blocked from new entries after any losing close.
    pub cooldown_minutes_after_loss: f64,
    /// Minutes a symbol is blocked from new entries after hitting
    /// `max_consecutive_losses` in a row.
    pub cooldown_minutes_after_streak: f64,
    /// Absolute funding rate percent above which a proposal is rejected outright.
    pub funding_hard_pct: f64,
    /// Absolute funding rate percent above which a proposal is approved but
    /// down-sized (`size_multiplier *= 0.75`).
    pub funding_soft_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_pct: 0.5,
            max_leverage: 3.0,
            max_daily_loss_pct: 2.0,
            max_drawdown_pct: 8.0,
            max_positions: 1,
            max_consecutive_losses: 3,
            cooldown_minutes_after_loss: 60.0,
            cooldown_minutes_after_streak: 240.0,
            funding_hard_pct: 0.2,
            funding_soft_pct: 0.1,
        }
    }
}

impl RiskConfig {
    /// Clamp every field to its corresponding hard cap.
    pub fn clamp_to_hard_caps(mut self) -> Self {
        self.max_risk_pct = self.max_risk_pct.min(HardCaps::MAX_RISK_PCT);
        self.max_leverage = self.max_leverage.min(HardCaps::MAX_LEVERAGE);
        self.max_daily_loss_pct = self.max_daily_loss_pct.min(HardCaps::MAX_DAILY_LOSS_PCT);
        self.max_drawdown_pct = self.max_drawdown_pct.min(HardCaps::MAX_DRAWDOWN_PCT);
        self.max_positions = self.max_positions.min(HardCaps::MAX_POSITIONS);
        self.max_consecutive_losses = self
            .max_consecutive_losses
            .min(HardCaps::MAX_CONSECUTIVE_LOSSES);
        self
    }
}

/// Which fill model the execution simulator uses.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionModelKind {
    /// Fixed-percentage slippage, no partial fills.
    Ideal,
    /// ATR-scaled slippage with probabilistic partial fills.
    Realistic,
    /// Wraps another model and rejects orders when the simulated spread is too wide.
    SpreadAware,
}

/// Execution-simulation parameters.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Which fill model to use.
    pub model: ExecutionModelKind,
    /// Fixed slippage fraction applied by the ideal model.
    pub slippage_pct: f64,
    /// Seed for the realistic model's fill simulator.
    pub random_seed: u64,
    /// Maximum spread, in basis points, the spread-aware wrapper will fill through.
    pub max_spread_bps: f64,
    /// Taker commission rate, as a fraction of notional.
    pub commission_pct: f64,
    /// Base expected slippage, in basis points, before ATR and spread scaling.
    pub base_slippage_bps: f64,
    /// Multiplier applied to `atr_pct` in the realistic model's slippage formula.
    pub atr_slippage_scale: f64,
    /// Assumed half-spread, in basis points, folded into the realistic model's slippage.
    pub half_spread_bps: f64,
    /// Extra slippage, in basis points, added for market-like (non-limit) orders.
    pub market_order_slippage_bps: f64,
    /// Probability that a fill which clears the fill-probability check is only partial.
    pub partial_fill_probability: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            model: ExecutionModelKind::Realistic,
            slippage_pct: 0.0005,
            random_seed: 42,
            max_spread_bps: 10.0,
            commission_pct: 0.0004,
            base_slippage_bps: 1.0,
            atr_slippage_scale: 0.3,
            half_spread_bps: 2.0,
            market_order_slippage_bps: 3.0,
            partial_fill_probability: 0.08,
        }
    }
}

/// Funding-rate data source mode.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingMode {
    /// Use historical funding-rate bars loaded from the data source.
    Historical,
    /// Use a fixed constant rate for every settlement.
    Constant,
}

/// Funding-settlement parameters.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FundingConfig {
    /// Data source mode.
    pub mode: FundingMode,
    /// Constant rate used when `mode` is [`FundingMode::Constant`].
    pub constant_rate: f64,
    /// Hours between funding settlements.
    pub interval_hours: i64,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            mode: FundingMode::Historical,
            constant_rate: 0.0001,
            interval_hours: 8,
        }
    }
}

/// Top-level configuration for a single backtest run.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRunConfig {
    /// Symbols to replay, in no particular order.
    pub symbols: Vec<String>,
    /// Starting account equity, in quote currency.
    pub initial_equity: f64,
    /// Strategy configuration.
    pub strategy: StrategyConfig,
    /// Risk-engine configuration.
    pub risk: RiskConfig,
    /// Execution-simulation configuration.
    pub execution: ExecutionConfig,
    /// Funding-settlement configuration.
    pub funding: FundingConfig,
    /// Maximum number of positions selected per timestamp group across all symbols.
    pub max_portfolio_positions: u32,
}

impl BacktestRunConfig {
    /// Start building a config with every block defaulted.
    pub fn builder() -> BacktestRunConfigBuilder {
        BacktestRunConfigBuilder::default()
    }

    /// Validate every sub-block.
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(ConfigError::invalid("symbols", "must not be empty"));
        }
        if self.initial_equity <= 0.0 {
            return Err(ConfigError::invalid("initial_equity", "must be positive"));
        }
        self.strategy.validate()?;
        if self.execution.slippage_pct < 0.0 {
            return Err(ConfigError::invalid("slippage_pct", "must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.execution.partial_fill_probability) {
            return Err(ConfigError::invalid(
                "partial_fill_probability",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.max_portfolio_positions == 0 {
            return Err(ConfigError::invalid(
                "max_portfolio_positions",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`BacktestRunConfig`].
#[derive(Debug, Clone, Default)]
pub struct BacktestRunConfigBuilder {
    symbols: Vec<String>,
    initial_equity: Option<f64>,
    strategy: StrategyConfig,
    risk: RiskConfig,
    execution: ExecutionConfig,
    funding: FundingConfig,
    max_portfolio_positions: Option<u32>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            entry: EntryConfig::default(),
            exit: ExitConfig::default(),
            scoring: ScoringConfig::default(),
            regime: RegimeConfig::default(),
            indicators: IndicatorConfig::default(),
        }
    }
}

impl BacktestRunConfigBuilder {
    /// Set the symbol universe.
    pub fn symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Set the starting equity.
    pub fn initial_equity(mut self, equity: f64) -> Self {
        self.initial_equity = Some(equity);
        self
    }

    /// Override the strategy block.
    pub fn strategy(mut self, strategy: StrategyConfig) -> Self {
        self.strategy = strategy;
        self
    }

    /// Override the risk block. Hard caps are applied in [`Self::build`].
    pub fn risk(mut self, risk: RiskConfig) -> Self {
        self.risk = risk;
        self
    }

    /// Override the execution block.
    pub fn execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    /// Override the funding block.
    pub fn funding(mut self, funding: FundingConfig) -> Self {
        self.funding = funding;
        self
    }

    /// Set the maximum number of concurrent portfolio positions.
    pub fn max_portfolio_positions(mut self, max: u32) -> Self {
        self.max_portfolio_positions = Some(max);
        self
    }

    /// Finalize and validate the configuration.
    pub fn build(self) -> Result<BacktestRunConfig> {
        let config = BacktestRunConfig {
            symbols: self.symbols,
            initial_equity: self.initial_equity.unwrap_or(10_000.0),
            strategy: self.strategy,
            risk: self.risk.clamp_to_hard_caps(),
            execution: self.execution,
            funding: self.funding,
            max_portfolio_positions: self.max_portfolio_positions.unwrap_or(1),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_config_clamps_to_hard_caps() {
        let risk = RiskConfig {
            max_risk_pct: 5.0,
            max_leverage: 50.0,
            max_daily_loss_pct: 10.0,
            max_drawdown_pct: 90.0,
            max_positions: 10,
            max_consecutive_losses: 100,
            ..RiskConfig::default()
        }
        .clamp_to_hard_caps();

        assert_eq!(risk.max_risk_pct, HardCaps::MAX_RISK_PCT);
        assert_eq!(risk.max_leverage, HardCaps::MAX_LEVERAGE);
        assert_eq!(risk.max_positions, HardCaps::MAX_POSITIONS);
        assert_eq!(
            risk.max_consecutive_losses,
            HardCaps::MAX_CONSECUTIVE_LOSSES
        );
    }

    #[test]
    fn test_builder_rejects_empty_symbols() {
        let err = BacktestRunConfig::builder().initial_equity(1000.0).build();
        assert!(err.is_err());
    }

    #[test]
    fn test_builder_happy_path() {
        let config = BacktestRunConfig::builder()
            .symbols(["BTC-PERP", "ETH-PERP"])
            .initial_equity(10_000.0)
            .build()
            .unwrap();
        assert_eq!(config.symbols.len(), 2);
        assert_eq!(config.max_portfolio_positions, 1);
    }

    #[test]
    fn test_scoring_config_rejects_negative_weight() {
        let mut scoring = ScoringConfig::default();
        scoring.weight_trend = -0.1;
        assert!(scoring.validate().is_err());
    }

    #[test]
    fn test_strategy_config_rejects_inverted_emas() {
        let mut strategy = StrategyConfig::default();
        strategy.entry.ema_fast = 50;
        strategy.entry.ema_slow = 20;
        assert!(strategy.validate().is_err());
    }
}
