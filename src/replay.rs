//! Replay loop: the orchestrator that drives every other module through one
//! deterministic pass over a multi-symbol event stream.
//!
//! Per timestamp group: funding settlements apply first (lowest
//! [`crate::mux::EventPriority`]), then bar closes drive exits, then entry
//! proposals are generated, scored, risk-checked, and portfolio-selected
//! together across every symbol sharing that timestamp, then filled.

use std::collections::HashMap;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::BacktestRunConfig;
use crate::error::{DataError, Result};
use crate::execution::ExecutionModel;
use crate::funding::settlement_cashflow;
use crate::ledger::BacktestLedger;
use crate::model::{
    Bar, EquityPoint, FundingEvent, Interval, Position, PositionSide, Trade, TradeProposal,
    TradingState,
};
use crate::mux::{EventMux, MuxEvent};
use crate::pipeline::{self, FeatureSeries, PipelineConfig};
use crate::portfolio::{PortfolioSelector, TradeCandidate};
use crate::regime::{self, Regime};
use crate::result::{aggregate, BacktestResult, ExecutionStats};
use crate::risk_engine::{CooldownKind, RiskEngine, RiskState};
use crate::rulebook::RuleBook;
use crate::scoring::{ScoreInputs, ScoringEngine};
use crate::signal::{self, EntrySignal, ExitReason, SignalGenerator, Trend};
use crate::sizer::PositionSizer;

struct SymbolContext {
    bars: Vec<Bar>,
    features: FeatureSeries,
    daily_bars: Vec<Bar>,
    daily_features: FeatureSeries,
    daily_alignment: Vec<Option<usize>>,
}

impl SymbolContext {
    fn trend_at(&self, i: usize) -> Trend {
        match self.daily_alignment.get(i).copied().flatten() {
            Some(daily_idx) => {
                signal::determine_trend(&self.daily_bars, &self.daily_features, daily_idx)
            }
            None => Trend::NoTrend,
        }
    }
}

/// Orchestrates a full multi-symbol backtest.
pub struct ReplayLoop {
    config: BacktestRunConfig,
    contexts: HashMap<String, SymbolContext>,
    rulebook: RuleBook,
    state: TradingState,
    positions: HashMap<String, Position>,
    execution: ExecutionModel,
    ledger: BacktestLedger,
    risk_engine: RiskEngine,
    scoring_engine: ScoringEngine,
    signal_generator: SignalGenerator,
    stats: ExecutionStats,
    total_funding_net: f64,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    next_trade_id: u64,
}

impl ReplayLoop {
    /// Build a replay loop from validated configuration, loaded bar/funding
    /// history per symbol, and a symbol rule book.
    pub fn new(
        config: BacktestRunConfig,
        bars_by_symbol: HashMap<String, Vec<Bar>>,
        funding_by_symbol: HashMap<String, Vec<FundingEvent>>,
        rulebook: RuleBook,
        ledger: BacktestLedger,
    ) -> Result<Self> {
        let pipeline_config = PipelineConfig {
            ema_fast: config.strategy.entry.ema_fast,
            ema_slow: config.strategy.entry.ema_slow,
            rsi_period: config.strategy.entry.rsi_period,
            atr_period: config.strategy.indicators.atr_period,
            adx_period: config.strategy.indicators.adx_period,
            chop_period: config.strategy.indicators.chop_period,
            volume_period: config.strategy.indicators.volume_period,
        };

        let mut contexts = HashMap::new();
        for symbol in &config.symbols {
            let mut bars = bars_by_symbol
                .get(symbol)
                .cloned()
                .ok_or_else(|| DataError::SymbolNotFound(symbol.clone()))?;
            bars.sort_by_key(|b| (b.close_time, b.sequence));

            let daily_bars = signal::resample_daily(&bars);
            let daily_alignment = signal::align_daily_to_intraday(&bars, &daily_bars);

            let features = pipeline::compute(&bars, &pipeline_config)?;
            let daily_features = pipeline::compute(&daily_bars, &pipeline_config)?;

            contexts.insert(
                symbol.clone(),
                SymbolContext {
                    bars,
                    features,
                    daily_bars,
                    daily_features,
                    daily_alignment,
                },
            );
        }

        let mut funding_events: HashMap<String, Vec<FundingEvent>> = HashMap::new();
        for symbol in &config.symbols {
            funding_events.insert(
                symbol.clone(),
                funding_by_symbol.get(symbol).cloned().unwrap_or_default(),
            );
        }

        Ok(Self {
            execution: ExecutionModel::from_config(&config.execution),
            risk_engine: RiskEngine::new(config.risk),
            scoring_engine: ScoringEngine::new(config.strategy.scoring),
            signal_generator: SignalGenerator::new(config.strategy.entry, config.strategy.exit),
            state: TradingState::new(config.initial_equity),
            rulebook,
            ledger,
            contexts,
            positions: HashMap::new(),
            stats: ExecutionStats::default(),
            total_funding_net: 0.0,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            next_trade_id: 0,
            config,
        })
    }

    fn build_mux(&self, funding_by_symbol: &HashMap<String, Vec<FundingEvent>>) -> EventMux {
        let mut events = Vec::new();
        for (symbol, ctx) in &self.contexts {
            for bar in &ctx.bars {
                events.push(MuxEvent::Bar {
                    symbol: symbol.clone(),
                    interval: Interval::FourHour,
                    bar: *bar,
                });
            }
        }
        for (symbol, funding) in funding_by_symbol {
            for event in funding {
                events.push(MuxEvent::Funding {
                    symbol: symbol.clone(),
                    event: *event,
                });
            }
        }
        EventMux::new(events)
    }

    /// Run the full replay and return the aggregated result.
    pub fn run(&mut self, funding_by_symbol: HashMap<String, Vec<FundingEvent>>) -> Result<BacktestResult> {
        info!(symbols = ?self.config.symbols, "starting replay");
        let mut mux = self.build_mux(&funding_by_symbol);
        let mut bar_cursor: HashMap<String, usize> = HashMap::new();
        let mut global_sequence: u64 = 0;

        while !mux.is_empty() {
            let group = mux.next_timestamp_group();
            let Some(timestamp) = group.first().map(group_timestamp) else {
                break;
            };
            debug!(timestamp, events = group.len(), "processing timestamp group");

            let mut latest_prices: HashMap<String, f64> = HashMap::new();
            let mut entry_candidates: Vec<(TradeProposal, Bar)> = Vec::new();

            for event in &group {
                global_sequence += 1;
                self.state
                    .advance_sequence(global_sequence)
                    .map_err(crate::error::ReplayError::Invariant)?;

                match event {
                    MuxEvent::Funding { symbol, event } => {
                        self.apply_funding(symbol, event, timestamp)?;
                    }
                    MuxEvent::Bar { symbol, bar, .. } => {
                        self.stats.bars_processed += 1;
                        latest_prices.insert(symbol.clone(), bar.close);
                        let idx = bar_cursor.entry(symbol.clone()).or_insert(0);
                        self.handle_bar_close(symbol, *idx, timestamp, &mut entry_candidates)?;
                        *idx += 1;
                    }
                }
            }

            self.select_and_fill_entries(entry_candidates, timestamp)?;
            self.record_equity_point(timestamp, &latest_prices);
            self.check_circuit_breaker(timestamp);
        }

        info!(trades = self.trades.len(), "replay complete");
        let trades = std::mem::take(&mut self.trades);
        let equity_curve = std::mem::take(&mut self.equity_curve);
        Ok(aggregate(
            trades,
            equity_curve,
            self.config.initial_equity,
            &self.stats,
            self.total_funding_net,
        ))
    }

    fn apply_funding(&mut self, symbol: &str, event: &FundingEvent, timestamp: i64) -> Result<()> {
        self.stats.funding_events_processed += 1;
        let Some(position) = self.positions.get_mut(symbol) else {
            return Ok(());
        };
        let mark_price = event.mark_price.unwrap_or(position.entry_price);
        let cashflow = settlement_cashflow(position.side, position.quantity, mark_price, event.rate);
        position.apply_funding(cashflow, timestamp);
        self.state.equity += cashflow;
        self.total_funding_net += cashflow;

        self.ledger.append(
            "funding_settlement",
            timestamp,
            self.state.last_event_sequence,
            json!({
                "symbol": symbol,
                "rate": event.rate,
                "cashflow": cashflow,
            }),
            None,
        )?;
        Ok(())
    }

    fn handle_bar_close(
        &mut self,
        symbol: &str,
        idx: usize,
        timestamp: i64,
        entry_candidates: &mut Vec<(TradeProposal, Bar)>,
    ) -> Result<()> {
        let ctx = self
            .contexts
            .get(symbol)
            .ok_or_else(|| DataError::SymbolNotFound(symbol.to_string()))?;
        let Some(bar) = ctx.bars.get(idx).copied() else {
            return Ok(());
        };
        let feat = ctx.features.at(idx);
        let trend = ctx.trend_at(idx);

        if let Some(position) = self.positions.get(symbol).cloned() {
            self.evaluate_exit(symbol, &position, &bar, &feat, trend, timestamp)?;
            return Ok(());
        }

        let Some(atr) = feat.atr else {
            return Ok(());
        };
        if !regime::classify(feat.adx_or_fallback(), feat.chop_or_fallback(), &self.config.strategy.regime)
            .allows_entries()
        {
            return Ok(());
        }

        let Some(entry) = self.signal_generator.entry_at(&ctx.bars, &ctx.features, idx, trend) else {
            return Ok(());
        };

        let proposal = self.build_proposal(symbol, &entry, &ctx.features, idx, timestamp, atr);
        entry_candidates.push((proposal, bar));
        Ok(())
    }

    fn evaluate_exit(
        &mut self,
        symbol: &str,
        position: &Position,
        bar: &Bar,
        feat: &crate::pipeline::FeatureSnapshot,
        trend: Trend,
        timestamp: i64,
    ) -> Result<()> {
        let exit_config = self.config.strategy.exit;
        let atr = feat.atr.unwrap_or(0.0);

        let stop_hit = match position.side {
            PositionSide::Long => bar.low <= position.stop_price,
            PositionSide::Short => bar.high >= position.stop_price,
        };
        let take_profit_hit = position.take_profit.is_some_and(|tp| match position.side {
            PositionSide::Long => bar.high >= tp,
            PositionSide::Short => bar.low <= tp,
        });

        let reason_price = if stop_hit {
            Some(("stop_loss", position.stop_price))
        } else if take_profit_hit {
            Some(("take_profit", position.take_profit.unwrap()))
        } else {
            signal::check_exit(
                position,
                trend,
                timestamp,
                bar.close,
                atr,
                exit_config.time_stop_days,
                exit_config.time_stop_min_profit_atr,
            )
            .map(|s| (exit_reason_label(s.reason), s.price))
        };

        let Some((reason, exit_price_ref)) = reason_price else {
            return Ok(());
        };

        let fill = self.execution.fill(
            position.side.opposite(),
            position.quantity,
            exit_price_ref,
            atr,
            bar,
        );
        self.stats
            .record_fill(fill.filled, fill.fill_fraction, exit_price_ref, fill.price);
        if !fill.filled {
            return Ok(());
        }

        let position = self.positions.remove(symbol).expect("checked Some above");
        let funding_accumulated = position.funding_accumulated;
        let trade = position.close(timestamp, fill.price, fill.commission);
        let equity_delta = trade.pnl - funding_accumulated;
        self.state.record_close(equity_delta, trade.pnl, timestamp, &self.config.risk);

        self.ledger.append(
            "position_closed",
            timestamp,
            self.state.last_event_sequence,
            json!({
                "symbol": symbol,
                "reason": reason,
                "pnl": trade.pnl,
            }),
            None,
        )?;

        self.trades.push(trade);
        Ok(())
    }

    fn build_proposal(
        &mut self,
        symbol: &str,
        entry: &EntrySignal,
        features: &FeatureSeries,
        idx: usize,
        timestamp: i64,
        atr: f64,
    ) -> TradeProposal {
        let feat = features.at(idx);
        let ema_fast = feat.ema_fast.unwrap_or(0.0);
        let ema_fast_3_bars_ago = if idx >= 3 {
            features
                .ema_fast
                .get(idx - 3)
                .copied()
                .flatten()
                .unwrap_or(ema_fast)
        } else {
            ema_fast
        };
        let funding_rate = 0.0; // resolved from the latest settled funding rate when available
        let inputs = ScoreInputs {
            side: entry.side,
            ema_fast,
            ema_fast_3_bars_ago,
            ema_slow: feat.ema_slow.unwrap_or(0.0),
            price: entry.price,
            atr,
            entry_distance_atr: (entry.price - entry.stop_price).abs() / atr.max(f64::EPSILON),
            funding_rate,
            news_risk: crate::model::NewsRisk::default(),
            volume_ratio: feat.volume_ratio,
            crowding: None,
        };
        let breakdown = self.scoring_engine.score(&inputs);

        let trade_id = self.next_trade_id;
        self.next_trade_id += 1;

        let proposal = TradeProposal {
            trade_id,
            symbol: symbol.to_string(),
            side: entry.side,
            created_at: timestamp,
            entry_price: entry.price,
            stop_price: entry.stop_price,
            take_profit: None,
            atr,
            leverage: self.config.risk.max_leverage,
            composite_score: breakdown.composite,
            funding_penalty: 1.0 - breakdown.funding,
            liquidity_score: breakdown.volume,
            funding_rate,
            news_risk: inputs.news_risk,
            is_entry: true,
        };
        proposal
    }

    fn select_and_fill_entries(
        &mut self,
        entry_candidates: Vec<(TradeProposal, Bar)>,
        timestamp: i64,
    ) -> Result<()> {
        if entry_candidates.is_empty() {
            return Ok(());
        }

        let open_positions = self.positions.len() as u32;
        let cooldown_kind = if self.state.cooldown_is_streak {
            CooldownKind::AfterLossStreak
        } else {
            CooldownKind::AfterLoss
        };

        // Each symbol signals at most once per timestamp group; remember the
        // bar that produced the signal so the fill below reads the same bar
        // instead of reaching for whatever is newest in the loaded history.
        let mut signal_bars: HashMap<String, Bar> = HashMap::new();

        // Risk-approve every proposal first; only approved proposals compete
        // for the portfolio's remaining position slots, so a low-ranked but
        // approved candidate is never starved out by a high-ranked one that
        // the risk engine would have rejected anyway.
        let mut approved = Vec::new();
        for (proposal, bar) in entry_candidates {
            signal_bars.insert(proposal.symbol.clone(), bar);
            let filters = self
                .rulebook
                .get(&proposal.symbol, timestamp.div_euclid(crate::signal::MS_PER_DAY));
            let sizer = PositionSizer::new(filters);
            let sizing = sizer.calculate_size(
                self.state.equity,
                self.config.risk.max_risk_pct / 100.0,
                proposal.entry_price,
                proposal.stop_price,
                self.config.risk.max_leverage,
            );

            let open_already = self.positions.contains_key(&proposal.symbol);
            let risk_state = RiskState::from_trading_state(
                &self.state,
                open_positions,
                open_already,
                false,
                cooldown_kind,
            );
            let check = self
                .risk_engine
                .evaluate(&proposal, &risk_state, timestamp, Some(&sizing));
            if !check.approved {
                warn!(symbol = %proposal.symbol, reasons = ?check.reasons, "entry rejected by risk engine");
                continue;
            }
            approved.push(TradeCandidate { proposal, sizing });
        }

        let selected = PortfolioSelector::select(
            approved,
            self.config.max_portfolio_positions,
            open_positions,
        );

        for candidate in selected {
            let proposal = candidate.proposal;
            let sizing = candidate.sizing;
            if self.positions.contains_key(&proposal.symbol) {
                continue;
            }

            let Some(bar) = signal_bars.get(&proposal.symbol) else {
                continue;
            };
            let fill = self.execution.fill(
                proposal.side,
                sizing.quantity,
                proposal.entry_price,
                proposal.atr,
                bar,
            );
            self.stats
                .record_fill(fill.filled, fill.fill_fraction, proposal.entry_price, fill.price);
            if !fill.filled || sizing.quantity <= 0.0 {
                continue;
            }

            let position = Position {
                trade_id: proposal.trade_id,
                symbol: proposal.symbol.clone(),
                side: proposal.side,
                entry_time: timestamp,
                entry_price: fill.price,
                quantity: sizing.quantity * fill.fill_fraction,
                leverage: sizing.leverage,
                entry_commission: fill.commission,
                stop_price: proposal.stop_price,
                take_profit: proposal.take_profit,
                funding_accumulated: 0.0,
                last_funding_time: None,
            };

            self.ledger.append(
                "position_opened",
                timestamp,
                self.state.last_event_sequence,
                json!({
                    "symbol": proposal.symbol,
                    "side": format!("{:?}", proposal.side),
                    "quantity": position.quantity,
                    "entry_price": position.entry_price,
                }),
                None,
            )?;

            self.positions.insert(proposal.symbol.clone(), position);
        }
        Ok(())
    }

    fn record_equity_point(&mut self, timestamp: i64, latest_prices: &HashMap<String, f64>) {
        let unrealized: f64 = self
            .positions
            .values()
            .map(|pos| {
                let price = latest_prices.get(&pos.symbol).copied().unwrap_or(pos.entry_price);
                pos.unrealized_pnl(price)
            })
            .sum();

        let equity = self.state.equity + unrealized;
        self.state.peak_equity = self.state.peak_equity.max(equity);
        let drawdown_fraction = if self.state.peak_equity > 0.0 {
            ((self.state.peak_equity - equity) / self.state.peak_equity).max(0.0)
        } else {
            0.0
        };

        self.equity_curve.push(EquityPoint {
            timestamp,
            equity,
            drawdown_fraction,
            cash: self.state.equity,
            unrealized_pnl: unrealized,
        });
    }

    fn check_circuit_breaker(&mut self, timestamp: i64) {
        if !self.state.circuit_breaker_active
            && self.state.drawdown_pct() >= self.config.risk.max_drawdown_pct
        {
            self.state.circuit_breaker_active = true;
            warn!(timestamp, drawdown_pct = self.state.drawdown_pct(), "circuit breaker tripped");
        }
    }
}

fn exit_reason_label(reason: ExitReason) -> &'static str {
    match reason {
        ExitReason::TrendInvalidation => "trend_invalidation",
        ExitReason::TimeStop => "time_stop",
    }
}

fn group_timestamp(event: &MuxEvent) -> i64 {
    match event {
        MuxEvent::Bar { bar, .. } => bar.close_time,
        MuxEvent::Funding { event, .. } => event.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BacktestRunConfig;

    fn make_bars(symbol: &str, n: usize) -> Vec<Bar> {
        let _ = symbol;
        (0..n)
            .map(|i| {
                let price = 100.0 + (i as f64 * 0.1).sin() * 5.0 + i as f64 * 0.05;
                Bar {
                    open_time: Some(i as i64 * 14_400_000),
                    close_time: (i as i64 + 1) * 14_400_000,
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
    fn test_replay_loop_runs_to_completion_without_panicking() {
        let config = BacktestRunConfig::builder()
            .symbols(["BTC-PERP"])
            .initial_equity(10_000.0)
            .build()
            .unwrap();

        let mut bars_by_symbol = HashMap::new();
        bars_by_symbol.insert("BTC-PERP".to_string(), make_bars("BTC-PERP", 200));

        let mut replay = ReplayLoop::new(
            config,
            bars_by_symbol,
            HashMap::new(),
            RuleBook::default(),
            BacktestLedger::null(),
        )
        .unwrap();

        let result = replay.run(HashMap::new()).unwrap();
        assert!(result.bars_processed > 0);
        assert_eq!(result.initial_equity, 10_000.0);
    }

    #[test]
    fn test_sequence_must_not_go_backwards() {
        let mut state = TradingState::new(1_000.0);
        assert!(state.advance_sequence(1).is_ok());
        assert!(state.advance_sequence(0).is_err());
    }
}
