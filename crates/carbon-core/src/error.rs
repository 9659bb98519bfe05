//! Shared error kinds for the ingestion pipeline.
//!
//! Each crate in the workspace defines its own error enum for the failures
//! specific to that layer, but the kinds that cross component boundaries —
//! a malformed input line, a closed actor — live here so every crate agrees
//! on their shape.

/// Result type alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors shared across the cache, storage, and ingest layers.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A line did not have exactly three whitespace-separated fields, or a
    /// field failed to parse.
    #[error("cannot parse metric line: {0}")]
    Parse(#[from] ParseError),

    /// An operation was attempted after the owning actor (`MetricCache` or
    /// `StorageWriter`) had already closed.
    #[error("operation attempted on a closed component")]
    Closed,
}

/// Why a line failed to parse into a [`crate::Metric`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The line did not split into exactly three whitespace-separated
    /// fields.
    #[error("expected 3 fields, found {found}")]
    WrongFieldCount {
        /// Number of fields actually found.
        found: usize,
    },

    /// The value field did not parse as an `f64`.
    #[error("invalid value {value:?}")]
    InvalidValue {
        /// The offending field, as read from the wire.
        value: String,
    },

    /// The timestamp field did not parse as an `i64`.
    #[error("invalid timestamp {value:?}")]
    InvalidTimestamp {
        /// The offending field, as read from the wire.
        value: String,
    },

    /// The line exceeded the reader's maximum line length. Treated as a
    /// `ParseError` per the wire protocol contract.
    #[error("line too long ({len} bytes)")]
    LineTooLong {
        /// Observed line length in bytes.
        len: usize,
    },
}
