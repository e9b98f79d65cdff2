//! Backtest ledger: an append-only JSON-lines record of every event applied
//! during a replay, for after-the-fact audit and replay-determinism checks.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::LedgerError;

type Result<T> = std::result::Result<T, LedgerError>;

/// One ledger entry. `payload` is the event-specific body; `metadata` is an
/// optional free-form side channel (e.g. the active regime, funding rate in
/// effect) that doesn't belong on the payload's own type.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerRecord {
    pub event_id: u64,
    pub event_type: String,
    pub timestamp: i64,
    pub sequence_num: u64,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Appends [`LedgerRecord`]s to a JSON-lines file, buffering writes and
/// tracking a companion `sequence.txt` with the last written sequence
/// number so a crashed run can be resumed or audited without re-parsing the
/// whole ledger.
pub struct BacktestLedger {
    writer: Option<BufWriter<File>>,
    sequence_path: Option<PathBuf>,
    next_event_id: u64,
}

impl BacktestLedger {
    /// Open (creating if absent) a ledger file at `path`, appending to any
    /// existing content.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            sequence_path: Some(path.with_file_name(
                format!("{}.sequence.txt", path.file_stem().and_then(|s| s.to_str()).unwrap_or("ledger")),
            )),
            next_event_id: 0,
        })
    }

    /// A ledger that discards every record. Used when a caller explicitly
    /// opts out of audit logging.
    pub fn null() -> Self {
        Self {
            writer: None,
            sequence_path: None,
            next_event_id: 0,
        }
    }

    /// Append one record, assigning it the next `event_id`.
    pub fn append(&mut self, event_type: &str, timestamp: i64, sequence_num: u64, payload: impl Serialize, metadata: Option<Value>) -> Result<()> {
        let event_id = self.next_event_id;
        self.next_event_id += 1;

        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        let record = LedgerRecord {
            event_id,
            event_type: event_type.to_string(),
            timestamp,
            sequence_num,
            payload: serde_json::to_value(payload)?,
            metadata,
        };

        let line = serde_json::to_string(&record)?;
        writeln!(writer, "{line}")?;

        if let Some(seq_path) = &self.sequence_path {
            std::fs::write(seq_path, sequence_num.to_string())?;
        }

        Ok(())
    }

    /// Flush buffered writes to disk.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for BacktestLedger {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
