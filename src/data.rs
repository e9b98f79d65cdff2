//! Per-symbol data sources: CSV-backed bar and funding-event readers.
//!
//! Bar CSVs are read under three schemas, tried in order: the canonical
//! `open_time,close_time,open,high,low,close,volume`; a legacy
//! `open_time`-only schema that derives `close_time` from a configured
//! interval; and a bare `timestamp`-only schema (treated as `close_time`,
//! with `open_time` left `None`). Malformed rows are reported with their
//! 1-based line number rather than silently skipped.

use std::path::Path;

use serde::Deserialize;

use crate::error::DataError;
use crate::model::{Bar, FundingEvent, Interval};

type Result<T> = std::result::Result<T, DataError>;

#[derive(Debug, Deserialize)]
struct CanonicalRow {
    open_time: i64,
    close_time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct LegacyOpenTimeRow {
    open_time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct LegacyTimestampRow {
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn interval_ms(interval: Interval) -> i64 {
    match interval {
        Interval::FourHour => 4 * 3_600_000,
        Interval::Daily => 24 * 3_600_000,
    }
}

/// Read a symbol's bar history from a CSV file, auto-detecting its schema.
///
/// Bars are returned in file order with sequence numbers assigned densely
/// from `0`, then the caller is expected to sort/dedupe via
/// [`crate::mux`] if multiple sources are merged.
pub fn read_bars(path: impl AsRef<Path>, interval: Interval) -> Result<Vec<Bar>> {
    let path_ref = path.as_ref();
    let path_str = path_ref.display().to_string();
    let contents = std::fs::read_to_string(path_ref).map_err(|source| DataError::Io {
        path: path_str.clone(),
        source,
    })?;

    let header = contents
        .lines()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    if header.contains("close_time") {
        read_canonical(&contents, &path_str)
    } else if header.contains("open_time") {
        read_legacy_open_time(&contents, &path_str, interval)
    } else {
        read_legacy_timestamp(&contents, &path_str)
    }
}

fn read_canonical(contents: &str, path: &str) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_reader(contents.as_bytes());
    let mut bars = Vec::new();
    for (i, record) in reader.deserialize::<CanonicalRow>().enumerate() {
        let row = record.map_err(|e| DataError::MalformedRow {
            path: path.to_string(),
            line: i + 2,
            reason: e.to_string(),
        })?;
        bars.push(Bar {
            open_time: Some(row.open_time),
            close_time: row.close_time,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            sequence: i as u64,
        });
    }
    Ok(bars)
}

fn read_legacy_open_time(contents: &str, path: &str, interval: Interval) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_reader(contents.as_bytes());
    let step = interval_ms(interval);
    let mut bars = Vec::new();
    for (i, record) in reader.deserialize::<LegacyOpenTimeRow>().enumerate() {
        let row = record.map_err(|e| DataError::MalformedRow {
            path: path.to_string(),
            line: i + 2,
            reason: e.to_string(),
        })?;
        bars.push(Bar {
            open_time: Some(row.open_time),
            close_time: row.open_time + step,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            sequence: i as u64,
        });
    }
    Ok(bars)
}

fn read_legacy_timestamp(contents: &str, path: &str) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_reader(contents.as_bytes());
    let mut bars = Vec::new();
    for (i, record) in reader.deserialize::<LegacyTimestampRow>().enumerate() {
        let row = record.map_err(|e| DataError::MalformedRow {
            path: path.to_string(),
            line: i + 2,
            reason: e.to_string(),
        })?;
        bars.push(Bar {
            open_time: None,
            close_time: row.timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            sequence: i as u64,
        });
    }
    Ok(bars)
}

#[derive(Debug, Deserialize)]
struct FundingRow {
    timestamp: i64,
    rate: f64,
    mark_price: Option<f64>,
}

/// Read a symbol's historical funding events from a `timestamp,rate[,mark_price]` CSV.
pub fn read_funding(path: impl AsRef<Path>) -> Result<Vec<FundingEvent>> {
    let path_ref = path.as_ref();
    let path_str = path_ref.display().to_string();
    let contents = std::fs::read_to_string(path_ref).map_err(|source| DataError::Io {
        path: path_str.clone(),
        source,
    })?;

    let mut reader = csv::Reader::from_reader(contents.as_bytes());
    let mut events = Vec::new();
    for (i, record) in reader.deserialize::<FundingRow>().enumerate() {
        let row = record.map_err(|e| DataError::MalformedRow {
            path: path_str.clone(),
            line: i + 2,
            reason: e.to_string(),
        })?;
        events.push(FundingEvent {
            timestamp: row.timestamp,
            rate: row.rate,
            mark_price: row.mark_price,
            sequence: i as u64,
        });
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_canonical_schema() {
        let bars = read_canonical(
            "open_time,close_time,open,high,low,close,volume\n1,14400001,100,101,99,100.5,1000\n",
            "test.csv",
        )
        .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].open_time, Some(1));
        assert_eq!(bars[0].close_time, 14_400_001);
    }

    #[test]
    fn test_read_legacy_open_time_schema_derives_close_time() {
        let bars = read_legacy_open_time(
            "open_time,open,high,low,close,volume\n0,100,101,99,100.5,1000\n",
            "test.csv",
            Interval::FourHour,
        )
        .unwrap();
        assert_eq!(bars[0].close_time, 4 * 3_600_000);
    }

    #[test]
    fn test_read_legacy_timestamp_schema_leaves_open_time_none() {
        let bars = read_legacy_timestamp(
            "timestamp,open,high,low,close,volume\n123,100,101,99,100.5,1000\n",
            "test.csv",
        )
        .unwrap();
        assert_eq!(bars[0].open_time, None);
        assert_eq!(bars[0].close_time, 123);
    }

    #[test]
    fn test_malformed_row_reports_line_number() {
        let err = read_canonical(
            "open_time,close_time,open,high,low,close,volume\nnot_a_number,1,1,1,1,1,1\n",
            "test.csv",
        )
        .unwrap_err();
        match err {
            DataError::MalformedRow { line, .. } => assert_eq!(line, 2),
            other => panic!("expected MalformedRow, got {other:?}"),
        }
    }

    #[test]
    fn test_schema_detection_from_header() {
        assert!("close_time".contains("close_time"));
    }

    #[test]
    fn test_read_funding_row_parsing() {
        let mut reader = csv::Reader::from_reader("timestamp,rate,mark_price\n1000,0.0001,100.0\n".as_bytes());
        let row: FundingRow = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(row.timestamp, 1000);
        assert_eq!(row.rate, 0.0001);
        assert_eq!(row.mark_price, Some(100.0));
    }
}
