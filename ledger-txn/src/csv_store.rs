//! The CSV mutator: reads snapshots of the data CSV and applies a
//! transaction's pending operations atomically at COMMIT (spec.md §4.9).

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use ledger_csv::{parse_line, CsvRow, HEADER_LINE};

use crate::protocol::PendingOp;

/// Read every data row currently on disk (the header line is skipped).
/// Malformed lines are skipped with a warning rather than aborting the
/// read, since a session should still be able to SELECT/INSERT around a
/// historical bad row.
pub fn read_all(path: impl AsRef<Path>) -> std::io::Result<Vec<CsvRow>> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if index == 0 {
            continue; // header
        }
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Ok(row) => rows.push(row),
            Err(err) => tracing::warn!(%err, line_number = index + 1, "skipping malformed CSV line"),
        }
    }
    Ok(rows)
}

/// The highest id currently on disk, or 0 if the file is empty/absent.
pub fn max_id(rows: &[CsvRow]) -> u64 {
    rows.iter().map(|row| row.id).max().unwrap_or(0)
}

/// Whether `id` exists among `rows`.
pub fn contains(rows: &[CsvRow], id: u64) -> bool {
    rows.iter().any(|row| row.id == id)
}

/// Look up one row by id.
pub fn find<'a>(rows: &'a [CsvRow], id: u64) -> Option<&'a CsvRow> {
    rows.iter().find(|row| row.id == id)
}

/// Apply `pending` to the CSV at `path` atomically (spec.md §4.9): rewrite
/// a sibling temporary file applying deletes/updates/inserts, then
/// `rename(2)` it over the original. On any I/O failure, the temporary
/// file is removed and the original is left untouched.
pub fn commit(path: impl AsRef<Path>, pending: &[PendingOp]) -> crate::Result<()> {
    let path = path.as_ref();
    let temp_path = sibling_temp_path(path);

    match rewrite(path, &temp_path, pending) {
        Ok(()) => {
            std::fs::rename(&temp_path, path)?;
            Ok(())
        }
        Err(err) => {
            let _ = std::fs::remove_file(&temp_path);
            Err(err)
        }
    }
}

fn rewrite(path: &Path, temp_path: &Path, pending: &[PendingOp]) -> crate::Result<()> {
    let mut out = File::create(temp_path)?;
    writeln!(out, "{HEADER_LINE}")?;

    if let Ok(source) = File::open(path) {
        let reader = BufReader::new(source);
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if index == 0 || line.trim().is_empty() {
                continue;
            }
            let Ok(row) = parse_line(&line) else {
                continue;
            };

            if pending.iter().any(|op| matches!(op, PendingOp::Delete { id } if *id == row.id)) {
                continue;
            }
            if let Some(update) = pending.iter().find_map(|op| match op {
                PendingOp::Update { id, producer_pid, timestamp, payload } if *id == row.id => {
                    Some((*producer_pid, *timestamp, payload.clone()))
                }
                _ => None,
            }) {
                let (producer_pid, timestamp, payload) = update;
                let row = CsvRow::new(row.id, producer_pid, timestamp, payload)?;
                out.write_all(row.to_line().as_bytes())?;
            } else {
                out.write_all(row.to_line().as_bytes())?;
            }
        }
    }

    for op in pending {
        if let PendingOp::Insert { id, producer_pid, timestamp, payload } = op {
            let row = CsvRow::new(*id, *producer_pid, *timestamp, payload.clone())?;
            out.write_all(row.to_line().as_bytes())?;
        }
    }

    out.flush()?;
    Ok(())
}

pub(crate) fn sibling_temp_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".commit.tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ledger-txn-csvstore-test-{name}-{}", std::process::id()))
    }

    fn write_csv(path: &Path, rows: &[(u64, u32, i64, &str)]) {
        let mut file = File::create(path).unwrap();
        writeln!(file, "{HEADER_LINE}").unwrap();
        for (id, pid, ts, payload) in rows {
            writeln!(file, "{id},{pid},{ts},{payload}").unwrap();
        }
    }

    #[test]
    fn commit_applies_insert_update_and_delete_together() {
        let path = tmp_path("mixed");
        write_csv(&path, &[(1, 1, 100, "a"), (2, 1, 100, "b"), (3, 1, 100, "c")]);

        let pending = vec![
            PendingOp::Delete { id: 2 },
            PendingOp::Update { id: 3, producer_pid: 9, timestamp: 200, payload: "c-updated".into() },
            PendingOp::Insert { id: 4, producer_pid: 9, timestamp: 300, payload: "d".into() },
        ];
        commit(&path, &pending).unwrap();

        let rows = read_all(&path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(find(&rows, 1).unwrap().payload, "a");
        assert!(find(&rows, 2).is_none());
        assert_eq!(find(&rows, 3).unwrap().payload, "c-updated");
        assert_eq!(find(&rows, 4).unwrap().payload, "d");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn commit_against_missing_file_creates_it_from_inserts_only() {
        let path = tmp_path("fresh");
        let pending = vec![PendingOp::Insert { id: 1, producer_pid: 1, timestamp: 1, payload: "x".into() }];
        commit(&path, &pending).unwrap();

        let rows = read_all(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 1);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn no_pending_ops_leaves_file_unchanged() {
        let path = tmp_path("noop");
        write_csv(&path, &[(1, 1, 100, "a")]);
        commit(&path, &[]).unwrap();
        let rows = read_all(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payload, "a");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn commit_rejects_a_comma_bearing_insert_payload_and_leaves_source_untouched() {
        let path = tmp_path("bad-payload");
        write_csv(&path, &[(1, 1, 100, "a")]);

        let pending = vec![PendingOp::Insert { id: 2, producer_pid: 1, timestamp: 1, payload: "foo,bar".into() }];
        let err = commit(&path, &pending).unwrap_err();
        assert!(matches!(err, crate::TxnError::Csv(_)));

        let rows = read_all(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payload, "a");
        assert!(!sibling_temp_path(&path).exists());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn max_id_of_empty_rows_is_zero() {
        assert_eq!(max_id(&[]), 0);
    }
}
