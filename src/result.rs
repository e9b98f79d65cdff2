//! Result aggregator: folds the raw trade/equity stream from a completed
//! replay into the summary statistics a caller actually wants to read.

use std::collections::HashMap;

use crate::model::{EquityPoint, Trade};

/// Aggregated outcome of a single backtest run.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub initial_equity: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub win_rate: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub trades_by_symbol: HashMap<String, usize>,
    pub symbols_traded: Vec<String>,
    pub fill_rate: f64,
    pub avg_slippage_bps: f64,
    pub missed_entries: u64,
    pub partial_fills: u64,
    pub total_funding_paid: f64,
    pub bars_processed: u64,
    pub funding_events_processed: u64,
}

/// Accumulates execution-quality counters the replay loop updates as it
/// runs, then folds into a final [`BacktestResult`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    pub attempted_fills: u64,
    pub successful_fills: u64,
    pub partial_fills: u64,
    pub slippage_bps_sum: f64,
    pub slippage_samples: u64,
    pub bars_processed: u64,
    pub funding_events_processed: u64,
}

impl ExecutionStats {
    pub fn record_fill(&mut self, filled: bool, fill_fraction: f64, reference_price: f64, fill_price: f64) {
        self.attempted_fills += 1;
        if filled {
            self.successful_fills += 1;
            if fill_fraction < 1.0 {
                self.partial_fills += 1;
            }
            if reference_price > 0.0 {
                let slippage_bps = (fill_price - reference_price).abs() / reference_price * 10_000.0;
                self.slippage_bps_sum += slippage_bps;
                self.slippage_samples += 1;
            }
        }
    }
}

/// Build a [`BacktestResult`] from a completed run's trades, equity curve,
/// and execution-quality counters.
pub fn aggregate(
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    initial_equity: f64,
    stats: &ExecutionStats,
    total_funding_paid: f64,
) -> BacktestResult {
    let final_equity = equity_curve.last().map(|p| p.equity).unwrap_or(initial_equity);
    let total_return = if initial_equity > 0.0 {
        (final_equity - initial_equity) / initial_equity * 100.0
    } else {
        0.0
    };

    let total_trades = trades.len();
    let winners = trades.iter().filter(|t| t.is_profitable()).count();
    let win_rate = if total_trades > 0 {
        winners as f64 / total_trades as f64 * 100.0
    } else {
        0.0
    };

    let max_drawdown = equity_curve
        .iter()
        .map(|p| p.drawdown_fraction)
        .fold(0.0_f64, f64::max)
        * 100.0;

    let mut trades_by_symbol: HashMap<String, usize> = HashMap::new();
    for trade in &trades {
        *trades_by_symbol.entry(trade.symbol.clone()).or_insert(0) += 1;
    }
    let mut symbols_traded: Vec<String> = trades_by_symbol.keys().cloned().collect();
    symbols_traded.sort();

    let fill_rate = if stats.attempted_fills > 0 {
        stats.successful_fills as f64 / stats.attempted_fills as f64 * 100.0
    } else {
        0.0
    };
    let avg_slippage_bps = if stats.slippage_samples > 0 {
        stats.slippage_bps_sum / stats.slippage_samples as f64
    } else {
        0.0
    };
    let missed_entries = stats.attempted_fills.saturating_sub(stats.successful_fills);

    BacktestResult {
        trades,
        equity_curve,
        initial_equity,
        final_equity,
        total_return,
        win_rate,
        max_drawdown,
        total_trades,
        trades_by_symbol,
        symbols_traded,
        fill_rate,
        avg_slippage_bps,
        missed_entries,
        partial_fills: stats.partial_fills,
        total_funding_paid,
        bars_processed: stats.bars_processed,
        funding_events_processed: stats.funding_events_processed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PositionSide;

    fn trade(symbol: &str, pnl: f64) -> Trade {
        Trade {
            trade_id: 1,
            symbol: symbol.to_string(),
            side: PositionSide::Long,
            entry_time: 0,
            exit_time: 1,
            entry_price: 100.0,
            exit_price: 100.0 + pnl,
            quantity: 1.0,
            leverage: 1.0,
            commission: 0.0,
            funding_pnl: 0.0,
            pnl,
            return_pct: pnl,
        }
    }

    #[test]
    fn test_aggregate_computes_win_rate_and_return() {
        let trades = vec![trade("BTC-PERP", 10.0), trade("ETH-PERP", -5.0)];
        let equity_curve = vec![
            EquityPoint { timestamp: 0, equity: 1_000.0, drawdown_fraction: 0.0, cash: 1_000.0, unrealized_pnl: 0.0 },
            EquityPoint { timestamp: 1, equity: 1_005.0, drawdown_fraction: 0.0, cash: 1_005.0, unrealized_pnl: 0.0 },
        ];
        let stats = ExecutionStats {
            attempted_fills: 4,
            successful_fills: 3,
            partial_fills: 1,
            slippage_bps_sum: 30.0,
            slippage_samples: 3,
            bars_processed: 100,
            funding_events_processed: 10,
        };
        let result = aggregate(trades, equity_curve, 1_000.0, &stats, -2.0);

        assert_eq!(result.total_trades, 2);
        assert_eq!(result.win_rate, 50.0);
        assert!((result.total_return - 0.5).abs() < 1e-9);
        assert_eq!(result.symbols_traded, vec!["BTC-PERP".to_string(), "ETH-PERP".to_string()]);
        assert!((result.fill_rate - 75.0).abs() < 1e-9);
        assert_eq!(result.missed_entries, 1);
        assert_eq!(result.partial_fills, 1);
        assert_eq!(result.total_funding_paid, -2.0);
    }

    #[test]
    fn test_aggregate_handles_no_trades() {
        let result = aggregate(Vec::new(), Vec::new(), 1_000.0, &ExecutionStats::default(), 0.0);
        assert_eq!(result.total_trades, 0);
        assert_eq!(result.win_rate, 0.0);
        assert_eq!(result.final_equity, 1_000.0);
    }

    #[test]
    fn test_max_drawdown_from_equity_curve() {
        let equity_curve = vec![
            EquityPoint { timestamp: 0, equity: 1_000.0, drawdown_fraction: 0.0, cash: 1_000.0, unrealized_pnl: 0.0 },
            EquityPoint { timestamp: 1, equity: 900.0, drawdown_fraction: 0.10, cash: 900.0, unrealized_pnl: 0.0 },
        ];
        let result = aggregate(Vec::new(), equity_curve, 1_000.0, &ExecutionStats::default(), 0.0);
        assert!((result.max_drawdown - 10.0).abs() < 1e-9);
    }
}
