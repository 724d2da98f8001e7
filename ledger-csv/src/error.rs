//! Parse errors for a single CSV data row.

use thiserror::Error;

/// Result type alias for `ledger-csv` operations.
pub type Result<T> = std::result::Result<T, CsvParseError>;

/// Everything that can be wrong with one line of the data CSV.
///
/// Replaces the original implementation's `sscanf(line, "%d,", &current_id)`
/// pattern, which silently accepts a truncated or malformed line as long as
/// the first field scans as an integer - per spec.md §9's design note, a
/// parser here returns a tagged result instead of letting truncation or
/// overflow corrupt state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CsvParseError {
    /// The line did not split into exactly four comma-separated fields.
    #[error("expected 4 fields, found {found}")]
    WrongFieldCount {
        /// Number of fields actually found.
        found: usize,
    },

    /// The `ID` field was not a valid positive integer.
    #[error("invalid id field: {0:?}")]
    InvalidId(String),

    /// The `ID_PROCESO` field was not a valid integer.
    #[error("invalid producer pid field: {0:?}")]
    InvalidProducerPid(String),

    /// The `TIMESTAMP` field was not a valid integer.
    #[error("invalid timestamp field: {0:?}")]
    InvalidTimestamp(String),

    /// The payload exceeded the 255-byte bound from spec.md §3.
    #[error("payload length {len} exceeds maximum of 255 bytes")]
    PayloadTooLong {
        /// The offending payload's byte length.
        len: usize,
    },

    /// The payload contained a comma or newline, which would corrupt the
    /// single-line, comma-separated row format.
    #[error("payload contains a comma or newline")]
    PayloadHasDelimiter,
}
