//! Event multiplexer: merges every symbol's bar and funding streams into one
//! globally-ordered sequence the replay loop consumes timestamp group by
//! timestamp group.
//!
//! Ordering is a strict tuple: `(timestamp, priority, symbol, interval,
//! source sequence, insertion counter)`. The insertion counter is the final
//! tiebreaker and only ever increments when an event is pushed onto the
//! heap — never on pop — so replaying the exact same inputs always produces
//! the exact same order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::model::{Bar, FundingEvent, Interval};

/// Relative priority when two events land on the same timestamp. Lower
/// sorts first.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    Funding = 1,
    BarClose = 2,
    Spread = 3,
    Strategy = 4,
    Risk = 5,
    Execution = 6,
}

/// An event payload, tagged with the symbol/interval it came from.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum MuxEvent {
    Bar {
        symbol: String,
        interval: Interval,
        bar: Bar,
    },
    Funding {
        symbol: String,
        event: FundingEvent,
    },
}

impl MuxEvent {
    fn timestamp(&self) -> i64 {
        match self {
            Self::Bar { bar, .. } => bar.close_time,
            Self::Funding { event, .. } => event.timestamp,
        }
    }

    fn priority(&self) -> EventPriority {
        match self {
            Self::Bar { .. } => EventPriority::BarClose,
            Self::Funding { .. } => EventPriority::Funding,
        }
    }

    fn symbol(&self) -> &str {
        match self {
            Self::Bar { symbol, .. } => symbol,
            Self::Funding { symbol, .. } => symbol,
        }
    }

    fn interval_rank(&self) -> u8 {
        match self {
            Self::Bar { interval: Interval::FourHour, .. } => 0,
            Self::Bar { interval: Interval::Daily, .. } => 1,
            Self::Funding { .. } => 0,
        }
    }

    fn source_sequence(&self) -> u64 {
        match self {
            Self::Bar { bar, .. } => bar.sequence,
            Self::Funding { event, .. } => event.sequence,
        }
    }
}

struct HeapEntry {
    event: MuxEvent,
    counter: u64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}
impl Eq for HeapEntry {}

impl HeapEntry {
    fn sort_key(&self) -> (i64, EventPriority, &str, u8, u64, u64) {
        (
            self.event.timestamp(),
            self.event.priority(),
            self.event.symbol(),
            self.event.interval_rank(),
            self.event.source_sequence(),
            self.counter,
        )
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest sort key pops first.
        other.sort_key().cmp(&self.sort_key())
    }
}

/// A min-heap merge of per-symbol event streams, ordered deterministically.
pub struct EventMux {
    heap: BinaryHeap<HeapEntry>,
    counter: u64,
}

impl EventMux {
    /// Build a multiplexer from a complete set of events, already known up
    /// front (a full bar/funding history load, not streamed).
    pub fn new(events: Vec<MuxEvent>) -> Self {
        let mut mux = Self {
            heap: BinaryHeap::with_capacity(events.len()),
            counter: 0,
        };
        for event in events {
            mux.push(event);
        }
        mux
    }

    /// Insert one more event. The insertion counter increments exactly once
    /// per call, regardless of how many events are ever popped.
    pub fn push(&mut self, event: MuxEvent) {
        self.heap.push(HeapEntry {
            event,
            counter: self.counter,
        });
        self.counter += 1;
    }

    /// Pop the next event in deterministic order.
    pub fn pop(&mut self) -> Option<MuxEvent> {
        self.heap.pop().map(|entry| entry.event)
    }

    /// Whether any events remain.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drain every event sharing the next timestamp as one group, in their
    /// relative heap order.
    pub fn next_timestamp_group(&mut self) -> Vec<MuxEvent> {
        let mut group = Vec::new();
        let Some(first) = self.pop() else {
            return group;
        };
        let ts = first.timestamp();
        group.push(first);
        while let Some(next) = self.heap.peek() {
            if next.event.timestamp() != ts {
                break;
            }
            group.push(self.pop().expect("peeked entry must be present"));
        }
        group
    }
}

/// Groups a flat event list by shared timestamp, preserving relative order
/// within each group. Useful for tests and offline analysis; the live replay
/// loop uses [`EventMux::next_timestamp_group`] instead.
pub fn group_by_timestamp(events: &[MuxEvent]) -> Vec<Vec<&MuxEvent>> {
    let mut groups: Vec<Vec<&MuxEvent>> = Vec::new();
    for event in events {
        match groups.last_mut() {
            Some(last) if last[0].timestamp() == event.timestamp() => last.push(event),
            _ => groups.push(vec![event]),
        }
    }
    groups
}

/// Splits a group into (bars, funding events), preserving order within each.
pub fn separate_by_type(group: &[MuxEvent]) -> (Vec<&MuxEvent>, Vec<&MuxEvent>) {
    group
        .iter()
        .partition(|e| matches!(e, MuxEvent::Bar { .. }))
}

/// Extracts just the bars in a group, keyed by symbol.
pub fn bars_by_symbol(group: &[MuxEvent]) -> Vec<(&str, &Bar)> {
    group
        .iter()
        .filter_map(|e| match e {
            MuxEvent::Bar { symbol, bar, .. } => Some((symbol.as_str(), bar)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar_event(symbol: &str, close_time: i64, sequence: u64) -> MuxEvent {
        MuxEvent::Bar {
            symbol: symbol.to_string(),
            interval: Interval::FourHour,
            bar: Bar {
                open_time: Some(close_time - 1),
                close_time,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
                sequence,
            },
        }
    }

    fn funding_event(symbol: &str, timestamp: i64) -> MuxEvent {
        MuxEvent::Funding {
            symbol: symbol.to_string(),
            event: FundingEvent {
                timestamp,
                rate: 0.0001,
                mark_price: None,
                sequence: 0,
            },
        }
    }

    #[test]
    fn test_orders_by_timestamp() {
        let mut mux = EventMux::new(vec![bar_event("B", 200, 0), bar_event("A", 100, 0)]);
        assert_eq!(mux.pop().unwrap().timestamp(), 100);
        assert_eq!(mux.pop().unwrap().timestamp(), 200);
    }

    #[test]
    fn test_funding_sorts_before_bar_at_same_timestamp() {
        let mut mux = EventMux::new(vec![bar_event("A", 100, 0), funding_event("A", 100)]);
        let first = mux.pop().unwrap();
        assert!(matches!(first, MuxEvent::Funding { .. }));
    }

    #[test]
    fn test_ties_broken_by_symbol_then_insertion_order() {
        let mut mux = EventMux::new(vec![bar_event("B", 100, 0), bar_event("A", 100, 0)]);
        let first = mux.pop().unwrap();
        assert_eq!(first.symbol(), "A");
    }

    #[test]
    fn test_next_timestamp_group_drains_only_matching_timestamp() {
        let mut mux = EventMux::new(vec![
            bar_event("A", 100, 0),
            bar_event("B", 100, 0),
            bar_event("C", 200, 0),
        ]);
        let group = mux.next_timestamp_group();
        assert_eq!(group.len(), 2);
        assert!(!mux.is_empty());
    }

    #[test]
    fn test_counter_increments_only_on_push() {
        let mut mux = EventMux::new(vec![bar_event("A", 100, 0)]);
        assert_eq!(mux.counter, 1);
        mux.pop();
        assert_eq!(mux.counter, 1);
        mux.push(bar_event("B", 100, 0));
        assert_eq!(mux.counter, 2);
    }

    #[test]
    fn test_group_by_timestamp_helper() {
        let events = vec![bar_event("A", 100, 0), bar_event("B", 100, 0), bar_event("C", 200, 0)];
        let groups = group_by_timestamp(&events);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn test_bars_by_symbol_filters_funding() {
        let events = vec![bar_event("A", 100, 0), funding_event("B", 100)];
        let bars = bars_by_symbol(&events);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].0, "A");
    }
}
