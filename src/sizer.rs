//! Position sizing: converts a risk budget and stop distance into an
//! exchange-compliant order quantity.

use crate::model::SymbolFilters;

/// Result of a sizing calculation.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSize {
    /// Order quantity, rounded down to the symbol's step size.
    pub quantity: f64,
    /// Notional value at the reference price.
    pub notional: f64,
    /// Leverage implied by `notional / margin`.
    pub leverage: f64,
    /// Whether the computed notional was below `min_notional` and therefore rejected.
    pub below_min_notional: bool,
}

/// Rounds a value down to the nearest multiple of `step`.
///
/// Mirrors floor-based exchange lot-size rounding: a position is never sized
/// up past what the risk budget allows.
pub fn round_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step).floor() * step
}

/// Computes position size from a risk budget.
///
/// `equity * risk_pct` is the dollar amount allowed to be lost if the stop
/// is hit; dividing by the per-unit stop distance gives the raw quantity,
/// which is then floored to `filters.step_size` and capped by
/// `filters.max_leverage`.
pub struct PositionSizer {
    filters: SymbolFilters,
}

impl PositionSizer {
    /// Build a sizer for a symbol's exchange filters.
    pub fn new(filters: SymbolFilters) -> Self {
        Self { filters }
    }

    /// Calculate an order size for a risk-budgeted entry.
    ///
    /// `equity` is total account equity, `risk_pct` the fraction of it to
    /// risk, `entry_price`/`stop_price` bound the per-unit loss, and
    /// `max_leverage` is the smaller of the risk config's leverage cap and
    /// the symbol's own `max_leverage` filter.
    pub fn calculate_size(
        &self,
        equity: f64,
        risk_pct: f64,
        entry_price: f64,
        stop_price: f64,
        max_leverage: f64,
    ) -> PositionSize {
        let stop_distance = (entry_price - stop_price).abs();
        if stop_distance <= 0.0 || entry_price <= 0.0 {
            return PositionSize {
                quantity: 0.0,
                notional: 0.0,
                leverage: 0.0,
                below_min_notional: true,
            };
        }

        let risk_budget = equity * risk_pct;
        let raw_quantity = risk_budget / stop_distance;
        let quantity = round_step(raw_quantity, self.filters.step_size);
        let notional = quantity * entry_price;

        let leverage_cap = max_leverage.min(self.filters.max_leverage);
        let margin = equity.max(f64::EPSILON);
        let implied_leverage = notional / margin;

        let (quantity, notional, leverage) = if implied_leverage > leverage_cap {
            let capped_notional = margin * leverage_cap;
            let capped_quantity = round_step(capped_notional / entry_price, self.filters.step_size);
            (
                capped_quantity,
                capped_quantity * entry_price,
                leverage_cap,
            )
        } else {
            (quantity, notional, implied_leverage)
        };

        let below_min = notional < self.filters.min_notional || quantity < self.filters.min_qty;

        PositionSize {
            quantity,
            notional,
            leverage,
            below_min_notional: below_min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters() -> SymbolFilters {
        SymbolFilters {
            tick_size: 0.01,
            step_size: 0.001,
            min_qty: 0.001,
            min_notional: 5.0,
            max_leverage: 10.0,
        }
    }

    #[test]
    fn test_round_step_floors() {
        assert!((round_step(1.2349, 0.001) - 1.234).abs() < 1e-9);
        assert_eq!(round_step(5.0, 0.0), 5.0);
    }

    #[test]
    fn test_calculate_size_basic() {
        let sizer = PositionSizer::new(filters());
        // equity=10000, risk=0.01 -> budget=100; stop distance=5 -> qty=20
        let size = sizer.calculate_size(10_000.0, 0.01, 100.0, 95.0, 5.0);
        assert!((size.quantity - 20.0).abs() < 1e-9);
        assert!(!size.below_min_notional);
    }

    #[test]
    fn test_calculate_size_caps_leverage() {
        let sizer = PositionSizer::new(filters());
        // risk budget would imply huge quantity/leverage; cap at 5x
        let size = sizer.calculate_size(10_000.0, 0.5, 100.0, 99.0, 5.0);
        assert!(size.leverage <= 5.0 + 1e-9);
    }

    #[test]
    fn test_calculate_size_zero_stop_distance() {
        let sizer = PositionSizer::new(filters());
        let size = sizer.calculate_size(10_000.0, 0.01, 100.0, 100.0, 5.0);
        assert_eq!(size.quantity, 0.0);
        assert!(size.below_min_notional);
    }

    #[test]
    fn test_calculate_size_below_min_notional() {
        let sizer = PositionSizer::new(filters());
        let size = sizer.calculate_size(100.0, 0.001, 100.0, 99.0, 5.0);
        assert!(size.below_min_notional);
    }
}
