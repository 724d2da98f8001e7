//! `CsvRow` - the single typed representation of one data row, shared by
//! the generator coordinator's ordered writer (spec.md §4.4) and the
//! transactional server's mutator (spec.md §4.9).

use crate::error::{CsvParseError, Result};

/// Maximum payload length in bytes (spec.md §3: "length < 256").
pub const MAX_PAYLOAD_LEN: usize = 255;

/// The CSV header line, written exactly once per file (spec.md §6).
pub const HEADER_LINE: &str = "ID,ID_PROCESO,TIMESTAMP,DATO_ALEATORIO";

/// One row of the data CSV: `ID,ID_PROCESO,TIMESTAMP,DATO_ALEATORIO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    /// Positive, unique row identifier.
    pub id: u64,
    /// PID of the process that produced or last wrote this row.
    pub producer_pid: u32,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Free-form payload; never contains `,` or `\n` and is under
    /// [`MAX_PAYLOAD_LEN`] bytes.
    pub payload: String,
}

impl CsvRow {
    /// Build a row, validating the payload the same way [`parse_line`]
    /// does so a row constructed in code can never produce an
    /// unparseable line.
    pub fn new(id: u64, producer_pid: u32, timestamp: i64, payload: String) -> Result<Self> {
        validate_payload(&payload)?;
        Ok(Self { id, producer_pid, timestamp, payload })
    }

    /// Render this row as one CSV line, including the trailing newline.
    pub fn to_line(&self) -> String {
        format!("{},{},{},{}\n", self.id, self.producer_pid, self.timestamp, self.payload)
    }
}

/// Validate a payload against spec.md §3's bounds (length < 256, no comma or
/// newline) without constructing a full [`CsvRow`]. Exposed so callers that
/// need to reject a bad payload before they have the rest of a row's fields
/// (e.g. a wire-protocol handler assigning an id only after validation
/// passes) don't have to build a throwaway row just to validate.
pub fn validate_payload(payload: &str) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(CsvParseError::PayloadTooLong { len: payload.len() });
    }
    if payload.contains(',') || payload.contains('\n') || payload.contains('\r') {
        return Err(CsvParseError::PayloadHasDelimiter);
    }
    Ok(())
}

/// Parse one data line (no trailing newline required) into a [`CsvRow`].
///
/// Does not accept the header line - callers are expected to read and
/// discard the header separately, as the coordinator and the mutator both
/// do.
pub fn parse_line(line: &str) -> Result<CsvRow> {
    let line = line.trim_end_matches(['\n', '\r']);
    let fields: Vec<&str> = line.splitn(4, ',').collect();
    if fields.len() != 4 {
        return Err(CsvParseError::WrongFieldCount { found: fields.len() });
    }

    let id = fields[0]
        .parse::<u64>()
        .map_err(|_| CsvParseError::InvalidId(fields[0].to_string()))?;
    let producer_pid = fields[1]
        .parse::<u32>()
        .map_err(|_| CsvParseError::InvalidProducerPid(fields[1].to_string()))?;
    let timestamp = fields[2]
        .parse::<i64>()
        .map_err(|_| CsvParseError::InvalidTimestamp(fields[2].to_string()))?;
    let payload = fields[3].to_string();
    validate_payload(&payload)?;

    Ok(CsvRow { id, producer_pid, timestamp, payload })
}
