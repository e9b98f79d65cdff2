//! Grid-search and walk-forward parameter search, built on the same
//! multi-symbol [`crate::replay::ReplayLoop`] used for a single run.
//!
//! Gated behind the `backtesting` feature (it pulls in `rayon` for parallel
//! grid evaluation), the same feature flag the original indicator/backtest
//! modules used it for.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::config::BacktestRunConfig;
use crate::error::Result;
use crate::ledger::BacktestLedger;
use crate::model::{Bar, FundingEvent};
use crate::result::BacktestResult;
use crate::rulebook::RuleBook;

/// One point in a parameter grid, paired with its resulting metric.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct GridPoint {
    pub config: BacktestRunConfig,
    pub result: BacktestResult,
}

/// Runs every candidate configuration in parallel and returns every result,
/// ranked by total return descending.
///
/// `bars_by_symbol`/`funding_by_symbol` are shared read-only across all
/// candidates; each candidate gets its own [`crate::replay::ReplayLoop`]
/// writing to a null ledger (grid search does not persist per-candidate
/// audit trails, only the winning configuration's replay should be re-run
/// with a real ledger afterward).
pub fn grid_search(
    candidates: Vec<BacktestRunConfig>,
    bars_by_symbol: &HashMap<String, Vec<Bar>>,
    funding_by_symbol: &HashMap<String, Vec<FundingEvent>>,
    rulebook: &RuleBook,
) -> Vec<GridPoint> {
    let mut points: Vec<GridPoint> = candidates
        .into_par_iter()
        .filter_map(|config| {
            run_one(config.clone(), bars_by_symbol, funding_by_symbol, rulebook)
                .ok()
                .map(|result| GridPoint { config, result })
        })
        .collect();

    points.sort_by(|a, b| {
        b.result
            .total_return
            .partial_cmp(&a.result.total_return)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    points
}

/// One walk-forward fold: an in-sample window used to pick parameters (by
/// the caller, via [`grid_search`]) and an out-of-sample window the chosen
/// configuration is then replayed against.
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct WalkForwardWindow {
    pub in_sample_start: i64,
    pub in_sample_end: i64,
    pub out_of_sample_start: i64,
    pub out_of_sample_end: i64,
}

/// Result of one walk-forward fold: the out-of-sample replay of whichever
/// configuration the caller selected from the in-sample grid search.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct WalkForwardFold {
    pub window: WalkForwardWindow,
    pub selected_config: BacktestRunConfig,
    pub out_of_sample_result: BacktestResult,
}

/// Runs a full walk-forward study: for each window, grid-search the
/// in-sample slice, pick the best candidate by total return, then replay it
/// out-of-sample.
pub fn walk_forward(
    windows: &[WalkForwardWindow],
    candidate_template: &BacktestRunConfig,
    candidate_grid: impl Fn(&BacktestRunConfig) -> Vec<BacktestRunConfig>,
    bars_by_symbol: &HashMap<String, Vec<Bar>>,
    funding_by_symbol: &HashMap<String, Vec<FundingEvent>>,
    rulebook: &RuleBook,
) -> Vec<WalkForwardFold> {
    windows
        .iter()
        .filter_map(|window| {
            let in_sample_bars = slice_bars(bars_by_symbol, window.in_sample_start, window.in_sample_end);
            let in_sample_funding =
                slice_funding(funding_by_symbol, window.in_sample_start, window.in_sample_end);

            let candidates = candidate_grid(candidate_template);
            let grid = grid_search(candidates, &in_sample_bars, &in_sample_funding, rulebook);
            let best = grid.into_iter().next()?;

            let out_of_sample_bars =
                slice_bars(bars_by_symbol, window.out_of_sample_start, window.out_of_sample_end);
            let out_of_sample_funding = slice_funding(
                funding_by_symbol,
                window.out_of_sample_start,
                window.out_of_sample_end,
            );

            let out_of_sample_result = run_one(
                best.config.clone(),
                &out_of_sample_bars,
                &out_of_sample_funding,
                rulebook,
            )
            .ok()?;

            Some(WalkForwardFold {
                window: *window,
                selected_config: best.config,
                out_of_sample_result,
            })
        })
        .collect()
}

fn slice_bars(bars_by_symbol: &HashMap<String, Vec<Bar>>, start: i64, end: i64) -> HashMap<String, Vec<Bar>> {
    bars_by_symbol
        .iter()
        .map(|(symbol, bars)| {
            let sliced = bars
                .iter()
                .filter(|b| b.close_time >= start && b.close_time <= end)
                .copied()
                .collect();
            (symbol.clone(), sliced)
        })
        .collect()
}

fn slice_funding(
    funding_by_symbol: &HashMap<String, Vec<FundingEvent>>,
    start: i64,
    end: i64,
) -> HashMap<String, Vec<FundingEvent>> {
    funding_by_symbol
        .iter()
        .map(|(symbol, events)| {
            let sliced = events
                .iter()
                .filter(|e| e.timestamp >= start && e.timestamp <= end)
                .copied()
                .collect();
            (symbol.clone(), sliced)
        })
        .collect()
}

fn run_one(
    config: BacktestRunConfig,
    bars_by_symbol: &HashMap<String, Vec<Bar>>,
    funding_by_symbol: &HashMap<String, Vec<FundingEvent>>,
    rulebook: &RuleBook,
) -> Result<BacktestResult> {
    let mut replay = crate::replay::ReplayLoop::new(
        config,
        bars_by_symbol.clone(),
        funding_by_symbol.clone(),
        rulebook.clone(),
        BacktestLedger::null(),
    )?;
    replay.run(funding_by_symbol.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar {
                open_time: Some(i as i64 * 14_400_000),
                close_time: (i as i64 + 1) * 14_400_000,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0 + i as f64 * 0.01,
                volume: 1_000.0,
                sequence: i as u64,
            })
            .collect()
    }

    #[test]
    fn test_grid_search_ranks_by_total_return_descending() {
        let mut bars_by_symbol = HashMap::new();
        bars_by_symbol.insert("BTC-PERP".to_string(), bars(100));

        let base = BacktestRunConfig::builder()
            .symbols(["BTC-PERP"])
            .initial_equity(10_000.0)
            .build()
            .unwrap();

        let candidates = vec![base.clone(), base];
        let expected_len = candidates.len();
        let points = grid_search(candidates, &bars_by_symbol, &HashMap::new(), &RuleBook::default());
        assert_eq!(points.len(), expected_len);
        if points.len() == 2 {
            assert!(points[0].result.total_return >= points[1].result.total_return);
        }
    }

    #[test]
    fn test_slice_bars_filters_by_window() {
        let mut bars_by_symbol = HashMap::new();
        bars_by_symbol.insert("BTC-PERP".to_string(), bars(10));
        let sliced = slice_bars(&bars_by_symbol, 4 * 14_400_000, 6 * 14_400_000);
        assert_eq!(sliced["BTC-PERP"].len(), 2);
    }
}
