//! The ordered CSV writer: emits drained records in strictly ascending id
//! order even though generators complete them out of order (spec.md §4.4).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ledger_csv::{CsvRow, HEADER_LINE};

use crate::protocol::Record;

/// What happened to a record handed to [`OrderedCsvWriter::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Written to the CSV immediately (it was the next expected id).
    Written,
    /// Stashed because it arrived ahead of `next_expected_id`.
    Pending,
    /// Dropped: `id < next_expected_id`, a duplicate or a protocol
    /// violation (spec.md §4.4).
    DuplicateOrLate,
    /// Dropped: `id` fell outside `[1..=total_records]`.
    OutOfRange,
}

/// Writes the data CSV, buffering out-of-order arrivals until their
/// predecessors land.
pub struct OrderedCsvWriter {
    file: BufWriter<File>,
    total_records: u64,
    next_expected_id: u64,
    written: u64,
    pending: BTreeMap<u64, Record>,
}

impl OrderedCsvWriter {
    /// Create (truncating) the output CSV at `path` and write its header
    /// line (spec.md §4.4: "Write CSV header once at start").
    pub fn create<P: AsRef<Path>>(path: P, total_records: u64) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut file = BufWriter::new(file);
        writeln!(file, "{HEADER_LINE}")?;
        file.flush()?;
        Ok(Self { file, total_records, next_expected_id: 1, written: 0, pending: BTreeMap::new() })
    }

    /// Feed one drained record through the ordering logic (spec.md §4.4).
    pub fn ingest(&mut self, record: Record) -> crate::Result<IngestOutcome> {
        if record.id < self.next_expected_id {
            tracing::warn!(id = record.id, next_expected = self.next_expected_id, "dropping late or duplicate record");
            return Ok(IngestOutcome::DuplicateOrLate);
        }
        if record.id < 1 || record.id > self.total_records {
            tracing::warn!(id = record.id, total_records = self.total_records, "dropping out-of-range record");
            return Ok(IngestOutcome::OutOfRange);
        }
        if record.id > self.next_expected_id {
            self.pending.insert(record.id, record);
            return Ok(IngestOutcome::Pending);
        }

        self.write_one(record)?;
        self.drain_contiguous_pending()?;
        Ok(IngestOutcome::Written)
    }

    fn write_one(&mut self, record: Record) -> crate::Result<()> {
        let row = CsvRow::new(record.id, record.producer_pid, record.timestamp, record.payload)?;
        self.file.write_all(row.to_line().as_bytes())?;
        self.file.flush()?;
        self.next_expected_id += 1;
        self.written += 1;
        Ok(())
    }

    fn drain_contiguous_pending(&mut self) -> crate::Result<()> {
        while let Some(record) = self.pending.remove(&self.next_expected_id) {
            self.write_one(record)?;
        }
        Ok(())
    }

    /// Number of rows written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Whether every id in `[1..=total_records]` has been written.
    pub fn is_complete(&self) -> bool {
        self.written >= self.total_records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ledger-gen-writer-test-{name}-{}", rand::random::<u32>()))
    }

    fn record(id: u64) -> Record {
        Record { id, producer_pid: 1, timestamp: 42, payload: "p".into() }
    }

    #[test]
    fn writes_in_order_arrivals_immediately() {
        let path = tmp_path("inorder");
        let mut writer = OrderedCsvWriter::create(&path, 3).unwrap();
        assert_eq!(writer.ingest(record(1)).unwrap(), IngestOutcome::Written);
        assert_eq!(writer.ingest(record(2)).unwrap(), IngestOutcome::Written);
        assert_eq!(writer.ingest(record(3)).unwrap(), IngestOutcome::Written);
        assert!(writer.is_complete());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn buffers_out_of_order_arrivals_then_drains_on_gap_fill() {
        let path = tmp_path("outoforder");
        let mut writer = OrderedCsvWriter::create(&path, 3).unwrap();
        assert_eq!(writer.ingest(record(3)).unwrap(), IngestOutcome::Pending);
        assert_eq!(writer.ingest(record(2)).unwrap(), IngestOutcome::Pending);
        assert_eq!(writer.written(), 0);
        assert_eq!(writer.ingest(record(1)).unwrap(), IngestOutcome::Written);
        assert_eq!(writer.written(), 3);
        assert!(writer.is_complete());

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], HEADER_LINE);
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("1,"));
        assert!(lines[2].starts_with("2,"));
        assert!(lines[3].starts_with("3,"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn drops_duplicate_and_out_of_range_records() {
        let path = tmp_path("dropped");
        let mut writer = OrderedCsvWriter::create(&path, 2).unwrap();
        assert_eq!(writer.ingest(record(1)).unwrap(), IngestOutcome::Written);
        assert_eq!(writer.ingest(record(1)).unwrap(), IngestOutcome::DuplicateOrLate);
        assert_eq!(writer.ingest(record(99)).unwrap(), IngestOutcome::OutOfRange);
        assert_eq!(writer.written(), 1);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn a_record_with_a_malformed_payload_surfaces_as_a_csv_error() {
        let path = tmp_path("malformed-payload");
        let mut writer = OrderedCsvWriter::create(&path, 1).unwrap();
        let bad = Record { id: 1, producer_pid: 1, timestamp: 42, payload: "has,comma".into() };
        let err = writer.ingest(bad).unwrap_err();
        assert!(matches!(err, crate::GenError::Csv(_)));
        let _ = std::fs::remove_file(&path);
    }
}
