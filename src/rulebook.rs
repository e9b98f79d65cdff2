//! Symbol rule book: per-symbol tick/step/min-qty/min-notional filters,
//! versioned by effective date so a backtest can pin one immutable snapshot.

use std::collections::HashMap;

use crate::model::SymbolFilters;

/// One dated snapshot of every symbol's exchange filters.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct RuleSnapshot {
    /// Date this snapshot became effective, as a UTC day number (days since epoch).
    pub effective_date: i64,
    /// Per-symbol filters in this snapshot.
    pub rules: HashMap<String, SymbolFilters>,
}

/// A set of dated [`RuleSnapshot`]s, queried by the as-of date a backtest pins.
///
/// Immutable after construction; a backtest selects one snapshot up front for
/// reproducibility and never reconsults the book mid-run.
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    snapshots: Vec<RuleSnapshot>,
}

impl RuleBook {
    /// Build a rule book from a set of dated snapshots, sorted internally by
    /// `effective_date`.
    pub fn new(mut snapshots: Vec<RuleSnapshot>) -> Self {
        snapshots.sort_by_key(|s| s.effective_date);
        Self { snapshots }
    }

    /// Select the snapshot with the greatest `effective_date <= target_date`;
    /// if none qualifies, the oldest available snapshot; `None` if the book
    /// is empty. Callers fall back to [`SymbolFilters::default`] in that case.
    pub fn snapshot_as_of(&self, target_date: i64) -> Option<&RuleSnapshot> {
        self.snapshots
            .iter()
            .rev()
            .find(|s| s.effective_date <= target_date)
            .or_else(|| self.snapshots.first())
    }

    /// Look up a symbol's filters as of `target_date`, falling back to
    /// [`SymbolFilters::default`] when the book is empty or the symbol is
    /// absent from the selected snapshot. Never fails.
    pub fn get(&self, symbol: &str, target_date: i64) -> SymbolFilters {
        self.snapshot_as_of(target_date)
            .and_then(|snap| snap.rules.get(symbol).copied())
            .unwrap_or_default()
    }
}
