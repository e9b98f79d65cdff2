//! Funding-rate provider: historical settlement events loaded from data, or a
//! synthetic constant-rate generator, behind one interface.

use crate::config::{FundingConfig, FundingMode};
use crate::model::FundingEvent;

const MS_PER_HOUR: i64 = 3_600_000;

/// Supplies funding-settlement events for a symbol.
#[non_exhaustive]
pub enum FundingProvider {
    /// Settlement events taken as-is from the data source.
    Historical(Vec<FundingEvent>),
    /// A fixed rate applied on a regular schedule, for symbols or ranges with
    /// no recorded funding history.
    Constant {
        rate: f64,
        interval_hours: i64,
        start_time: i64,
        end_time: i64,
    },
}

impl FundingProvider {
    /// Build a provider from configuration. `historical` is used as-is in
    /// [`FundingMode::Historical`]; in [`FundingMode::Constant`] mode the
    /// loaded history is ignored in favor of a synthetic schedule spanning
    /// `[start_time, end_time]`.
    pub fn from_config(
        config: &FundingConfig,
        historical: Vec<FundingEvent>,
        start_time: i64,
        end_time: i64,
    ) -> Self {
        match config.mode {
            FundingMode::Historical => Self::Historical(historical),
            FundingMode::Constant => Self::Constant {
                rate: config.constant_rate,
                interval_hours: config.interval_hours,
                start_time,
                end_time,
            },
        }
    }

    /// Materialize the full event stream, ordered by timestamp, with
    /// sequence numbers assigned densely from `0`.
    pub fn events(&self) -> Vec<FundingEvent> {
        match self {
            Self::Historical(events) => {
                let mut events = events.clone();
                events.sort_by_key(|e| e.timestamp);
                for (i, e) in events.iter_mut().enumerate() {
                    e.sequence = i as u64;
                }
                events
            }
            Self::Constant {
                rate,
                interval_hours,
                start_time,
                end_time,
            } => {
                let step = (*interval_hours).max(1) * MS_PER_HOUR;
                let mut out = Vec::new();
                let mut t = *start_time;
                let mut seq = 0u64;
                while t <= *end_time {
                    out.push(FundingEvent {
                        timestamp: t,
                        rate: *rate,
                        mark_price: None,
                        sequence: seq,
                    });
                    t += step;
                    seq += 1;
                }
                out
            }
        }
    }
}

/// Funding cashflow owed by a position of `quantity` units at `mark_price`
/// when an event with `rate` settles.
///
/// A positive `rate` means longs pay shorts: the cashflow returned here is
/// the amount *credited* to the position (negative for the paying side).
pub fn settlement_cashflow(side: crate::model::PositionSide, quantity: f64, mark_price: f64, rate: f64) -> f64 {
    let notional = quantity * mark_price;
    -side.sign() * rate * notional
}
