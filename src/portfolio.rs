//! Portfolio selector: ranks trade proposals competing for a shared
//! cross-symbol position cap and admits only the top scorers.

use crate::model::TradeProposal;
use crate::sizer::PositionSize;

/// A risk-approved proposal, paired with the sizing it was approved under so
/// the replay loop doesn't need to recompute it after selection.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct TradeCandidate {
    pub proposal: TradeProposal,
    pub sizing: PositionSize,
}

/// Selects the best-ranked entry proposals that fit within the remaining
/// portfolio capacity.
///
/// Sort key is `(-composite_score, -funding_penalty, -liquidity_score)`:
/// highest composite wins; ties break toward the lower funding cost, then
/// toward the more liquid symbol.
pub struct PortfolioSelector;

impl PortfolioSelector {
    /// Rank and admit proposals up to `max_positions - open_positions`.
    ///
    /// `candidates` are expected to already be risk-approved (the caller
    /// filters on that before building this list) and need not be
    /// pre-sorted; exit proposals (`is_entry == false`) are never subject to
    /// the cap and are always returned ahead of entries.
    pub fn select(
        candidates: Vec<TradeCandidate>,
        max_positions: u32,
        open_positions: u32,
    ) -> Vec<TradeCandidate> {
        let (mut exits, mut entries): (Vec<_>, Vec<_>) =
            candidates.into_iter().partition(|c| !c.proposal.is_entry);

        entries.sort_by(|a, b| {
            b.proposal
                .composite_score
                .partial_cmp(&a.proposal.composite_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    a.proposal
                        .funding_penalty
                        .partial_cmp(&b.proposal.funding_penalty)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    b.proposal
                        .liquidity_score
                        .partial_cmp(&a.proposal.liquidity_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });

        let remaining_capacity = max_positions.saturating_sub(open_positions) as usize;
        entries.truncate(remaining_capacity);

        exits.append(&mut entries);
        exits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewsRisk, PositionSide};

    fn sizing() -> PositionSize {
        PositionSize {
            quantity: 1.0,
            notional: 100.0,
            leverage: 1.0,
            below_min_notional: false,
        }
    }

    fn proposal(symbol: &str, composite: f64, funding_penalty: f64, liquidity: f64) -> TradeProposal {
        TradeProposal {
            trade_id: 0,
            symbol: symbol.to_string(),
            side: PositionSide::Long,
            created_at: 0,
            entry_price: 100.0,
            stop_price: 95.0,
            take_profit: None,
            atr: 2.0,
            leverage: 1.0,
            composite_score: composite,
            funding_penalty,
            liquidity_score: liquidity,
            funding_rate: 0.0,
            news_risk: NewsRisk::Low,
            is_entry: true,
        }
    }

    #[test]
    fn test_select_highest_composite_first() {
        let candidates = vec![
            TradeCandidate { proposal: proposal("A", 0.6, 0.1, 0.5), sizing: sizing() },
            TradeCandidate { proposal: proposal("B", 0.9, 0.1, 0.5), sizing: sizing() },
            TradeCandidate { proposal: proposal("C", 0.7, 0.1, 0.5), sizing: sizing() },
        ];
        let selected = PortfolioSelector::select(candidates, 2, 0);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].proposal.symbol, "B");
        assert_eq!(selected[1].proposal.symbol, "C");
    }

    #[test]
    fn test_tiebreak_by_funding_then_liquidity() {
        let candidates = vec![
            TradeCandidate { proposal: proposal("A", 0.8, 0.05, 0.9), sizing: sizing() },
            TradeCandidate { proposal: proposal("B", 0.8, 0.02, 0.1), sizing: sizing() },
        ];
        let selected = PortfolioSelector::select(candidates, 2, 0);
        assert_eq!(selected[0].proposal.symbol, "B");
    }

    #[test]
    fn test_respects_remaining_capacity() {
        let candidates = vec![
            TradeCandidate { proposal: proposal("A", 0.9, 0.0, 0.5), sizing: sizing() },
            TradeCandidate { proposal: proposal("B", 0.8, 0.0, 0.5), sizing: sizing() },
        ];
        let selected = PortfolioSelector::select(candidates, 1, 1);
        assert!(selected.is_empty());
    }

    #[test]
    fn test_exit_proposals_bypass_capacity() {
        let mut exit = proposal("A", 0.9, 0.0, 0.5);
        exit.is_entry = false;
        let candidates = vec![TradeCandidate { proposal: exit, sizing: sizing() }];
        let selected = PortfolioSelector::select(candidates, 0, 5);
        assert_eq!(selected.len(), 1);
    }
}
