//! Crate-wide error types.

use thiserror::Error;

/// Errors raised while building or validating a configuration block.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A parameter was outside its allowed range.
    #[error("invalid parameter '{param}': {reason}")]
    InvalidParameter {
        /// Parameter name.
        param: String,
        /// Reason for invalidity.
        reason: String,
    },
}

impl ConfigError {
    /// Construct an [`ConfigError::InvalidParameter`].
    pub fn invalid(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while loading or iterating bar/funding data sources.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DataError {
    /// Underlying I/O failure reading a data file.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A CSV row could not be parsed into the expected shape.
    #[error("malformed row in '{path}' at line {line}: {reason}")]
    MalformedRow {
        /// Source file.
        path: String,
        /// 1-based line number.
        line: usize,
        /// Reason parsing failed.
        reason: String,
    },

    /// No data was found for a requested symbol.
    #[error("no data found for symbol '{0}'")]
    SymbolNotFound(String),
}

/// Errors raised while replaying a backtest.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReplayError {
    /// Configuration failed validation before the replay started.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A data source failed during replay.
    #[error("data error: {0}")]
    Data(#[from] DataError),

    /// An indicator computation failed (insufficient history, bad period).
    #[error("indicator error: {0}")]
    Indicator(#[from] crate::indicators::IndicatorError),

    /// The ledger failed to persist an event.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Internal invariant violated; indicates a bug rather than bad input.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

/// Errors raised while writing the run ledger.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// Underlying I/O failure writing a ledger record.
    #[error("I/O error writing ledger: {0}")]
    Io(#[from] std::io::Error),

    /// A record failed to serialize to JSON.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ReplayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("max_leverage", "must be positive");
        assert!(err.to_string().contains("max_leverage"));
    }

    #[test]
    fn test_replay_error_from_config() {
        let err: ReplayError = ConfigError::invalid("x", "y").into();
        assert!(matches!(err, ReplayError::Config(_)));
    }
}
