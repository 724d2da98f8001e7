//! The client session protocol state machine (spec.md §4.8), run in a
//! forked child process that owns exactly one client socket.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use ledger_csv::{CsvRow, HEADER_LINE};

use crate::csv_store;
use crate::lock::{self, TransactionLock};
use crate::protocol::{parse_command, Command, PendingOp, MAX_PENDING_OPS};

/// Whether this session currently holds the transaction lock.
enum SessionState {
    Idle,
    InTx {
        lock: TransactionLock,
        base_rows: Vec<CsvRow>,
        pending: Vec<PendingOp>,
    },
}

/// One client's connection, transaction state, and pending-operation log
/// (spec.md §3 `ClientSession`).
pub struct ClientSession {
    stream: TcpStream,
    csv_path: PathBuf,
    lock_path: PathBuf,
    state: SessionState,
}

impl ClientSession {
    /// Build a session over an already-accepted socket.
    pub fn new(stream: TcpStream, csv_path: impl AsRef<Path>) -> Self {
        let csv_path = csv_path.as_ref().to_path_buf();
        let lock_path = sibling_lock_path(&csv_path);
        Self { stream, csv_path, lock_path, state: SessionState::Idle }
    }

    /// Send a greeting line, then process commands until EXIT or
    /// disconnect (spec.md §4.8). Disconnecting mid-transaction is treated
    /// as an implicit ROLLBACK.
    pub fn run(mut self, greeting: &str) -> std::io::Result<()> {
        self.send_line(greeting)?;

        let reader = BufReader::new(self.stream.try_clone()?);
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            let (response, should_close) = self.handle_line(&line);
            self.send_line(&response)?;
            if should_close {
                break;
            }
        }

        self.rollback_if_in_tx();
        Ok(())
    }

    fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stream.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            self.stream.write_all(b"\n")?;
        }
        self.stream.flush()
    }

    fn rollback_if_in_tx(&mut self) {
        if matches!(self.state, SessionState::InTx { .. }) {
            self.state = SessionState::Idle;
        }
    }

    /// Handle one command line, returning the full response text (without
    /// trailing newline, added by the caller) and whether the session
    /// should now close.
    fn handle_line(&mut self, line: &str) -> (String, bool) {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(_) => return ("ERROR: Comando no reconocido".to_string(), false),
        };

        if matches!(command, Command::Exit) {
            self.rollback_if_in_tx();
            return ("OK: Adios".to_string(), true);
        }

        let response = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Idle => self.handle_idle(command),
            SessionState::InTx { lock, base_rows, pending } => {
                self.handle_in_tx(command, lock, base_rows, pending)
            }
        };
        (response, false)
    }

    fn handle_idle(&mut self, command: Command) -> String {
        match command {
            Command::BeginTransaction => match lock::try_acquire_exclusive(&self.lock_path) {
                Ok(Some(acquired)) => {
                    let base_rows = csv_store::read_all(&self.csv_path).unwrap_or_default();
                    self.state = SessionState::InTx { lock: acquired, base_rows, pending: Vec::new() };
                    "OK: Transaccion iniciada".to_string()
                }
                Ok(None) => "ERROR: Transaccion activa en otro cliente".to_string(),
                Err(err) => format!("ERROR: no se pudo iniciar la transaccion: {err}"),
            },
            Command::Select { id } => self.select_idle(id),
            Command::CommitTransaction | Command::RollbackTransaction => {
                "ERROR: no hay transaccion activa".to_string()
            }
            Command::Insert { .. } | Command::Update { .. } | Command::Delete { .. } => {
                "ERROR: requires BEGIN TRANSACTION".to_string()
            }
            Command::Exit => unreachable!("handled before dispatch"),
        }
    }

    fn select_idle(&self, id: u64) -> String {
        match lock::is_free(&self.lock_path) {
            Ok(true) => {
                let rows = csv_store::read_all(&self.csv_path).unwrap_or_default();
                render_select_result(&rows, id)
            }
            Ok(false) => "ERROR: Transaccion activa".to_string(),
            Err(err) => format!("ERROR: no se pudo leer el estado de la transaccion: {err}"),
        }
    }

    fn handle_in_tx(
        &mut self,
        command: Command,
        lock: TransactionLock,
        base_rows: Vec<CsvRow>,
        mut pending: Vec<PendingOp>,
    ) -> String {
        match command {
            Command::CommitTransaction => {
                let result = csv_store::commit(&self.csv_path, &pending);
                // Lock and pending state are dropped either way: COMMIT
                // always returns to Idle, successful or not (spec.md §4.9
                // only keeps the session in InTx for a *rewrite* failure;
                // a FIFO-serialized commit against a file we alone hold
                // the lock on cannot otherwise fail except I/O).
                match result {
                    Ok(()) => {
                        self.state = SessionState::Idle;
                        "OK: Transaccion confirmada".to_string()
                    }
                    Err(_) => {
                        self.state = SessionState::InTx { lock, base_rows, pending };
                        "ERROR: no se pudieron aplicar las operaciones".to_string()
                    }
                }
            }
            Command::RollbackTransaction => {
                self.state = SessionState::Idle;
                "OK: Transaccion deshecha".to_string()
            }
            Command::Select { id } => {
                let response = render_select_result(&effective_view(&base_rows, &pending), id);
                self.state = SessionState::InTx { lock, base_rows, pending };
                response
            }
            Command::Insert { producer_pid, timestamp, payload } => {
                if pending.len() >= MAX_PENDING_OPS {
                    self.state = SessionState::InTx { lock, base_rows, pending };
                    return "ERROR: demasiadas operaciones pendientes".to_string();
                }
                if let Err(err) = ledger_csv::validate_payload(&payload) {
                    self.state = SessionState::InTx { lock, base_rows, pending };
                    return format!("ERROR: dato invalido: {err}");
                }
                let max_existing = csv_store::max_id(&base_rows);
                let max_pending = pending
                    .iter()
                    .filter_map(|op| match op {
                        PendingOp::Insert { id, .. } => Some(*id),
                        _ => None,
                    })
                    .max()
                    .unwrap_or(0);
                let new_id = max_existing.max(max_pending) + 1;
                pending.push(PendingOp::Insert { id: new_id, producer_pid, timestamp, payload });
                let response = format!("OK: Insertado con id {new_id}");
                self.state = SessionState::InTx { lock, base_rows, pending };
                response
            }
            Command::Update { id, producer_pid, timestamp, payload } => {
                let response = if !csv_store::contains(&base_rows, id) {
                    "ERROR: No se encontro registro".to_string()
                } else if let Err(err) = ledger_csv::validate_payload(&payload) {
                    format!("ERROR: dato invalido: {err}")
                } else if pending.len() >= MAX_PENDING_OPS {
                    "ERROR: demasiadas operaciones pendientes".to_string()
                } else {
                    pending.push(PendingOp::Update { id, producer_pid, timestamp, payload });
                    "OK: Actualizacion en cola".to_string()
                };
                self.state = SessionState::InTx { lock, base_rows, pending };
                response
            }
            Command::Delete { id } => {
                let response = if csv_store::contains(&base_rows, id) {
                    if pending.len() >= MAX_PENDING_OPS {
                        "ERROR: demasiadas operaciones pendientes".to_string()
                    } else {
                        pending.push(PendingOp::Delete { id });
                        "OK: Eliminacion en cola".to_string()
                    }
                } else {
                    "ERROR: No se encontro registro".to_string()
                };
                self.state = SessionState::InTx { lock, base_rows, pending };
                response
            }
            Command::BeginTransaction => {
                self.state = SessionState::InTx { lock, base_rows, pending };
                "ERROR: transaccion ya iniciada".to_string()
            }
            Command::Exit => unreachable!("handled before dispatch"),
        }
    }
}

/// Apply `pending` over `base_rows` in memory, for a session reading its
/// own uncommitted writes back via SELECT.
fn effective_view(base_rows: &[CsvRow], pending: &[PendingOp]) -> Vec<CsvRow> {
    let mut rows: Vec<CsvRow> = base_rows
        .iter()
        .filter(|row| !pending.iter().any(|op| matches!(op, PendingOp::Delete { id } if *id == row.id)))
        .map(|row| {
            pending
                .iter()
                .find_map(|op| match op {
                    PendingOp::Update { id, producer_pid, timestamp, payload } if *id == row.id => {
                        Some(CsvRow { id: row.id, producer_pid: *producer_pid, timestamp: *timestamp, payload: payload.clone() })
                    }
                    _ => None,
                })
                .unwrap_or_else(|| row.clone())
        })
        .collect();

    for op in pending {
        if let PendingOp::Insert { id, producer_pid, timestamp, payload } = op {
            rows.push(CsvRow { id: *id, producer_pid: *producer_pid, timestamp: *timestamp, payload: payload.clone() });
        }
    }
    rows
}

fn render_select_result(rows: &[CsvRow], id: u64) -> String {
    match csv_store::find(rows, id) {
        Some(row) => format!("RESULTADO:\n{HEADER_LINE}\n{}", row.to_line()),
        None => "ERROR: No se encontro registro".to_string(),
    }
}

pub(crate) fn sibling_lock_path(csv_path: &Path) -> PathBuf {
    let mut name = csv_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    csv_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_for(csv_path: &Path) -> ClientSession {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        std::mem::forget(client);
        ClientSession::new(server_side, csv_path)
    }

    fn tmp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ledger-txn-session-test-{name}-{}", std::process::id()))
    }

    #[test]
    fn insert_requires_an_open_transaction() {
        let path = tmp_path("requires-begin");
        let mut session = session_for(&path);
        let (response, closed) = session.handle_line("INSERT 1 1000 hello");
        assert_eq!(response, "ERROR: requires BEGIN TRANSACTION");
        assert!(!closed);
    }

    #[test]
    fn full_begin_insert_commit_select_round_trip() {
        let path = tmp_path("round-trip");
        let _ = std::fs::remove_file(&path);
        let mut session = session_for(&path);

        let (begin, _) = session.handle_line("BEGIN TRANSACTION");
        assert_eq!(begin, "OK: Transaccion iniciada");

        let (insert, _) = session.handle_line("INSERT 7 1000 foo");
        assert_eq!(insert, "OK: Insertado con id 1");

        let (commit, _) = session.handle_line("COMMIT TRANSACTION");
        assert_eq!(commit, "OK: Transaccion confirmada");

        let (select, _) = session.handle_line("SELECT 1");
        assert_eq!(select, format!("RESULTADO:\n{HEADER_LINE}\n1,7,1000,foo\n"));

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(sibling_lock_path(&path));
    }

    #[test]
    fn insert_with_comma_in_payload_is_rejected() {
        let path = tmp_path("insert-comma");
        let _ = std::fs::remove_file(&path);
        let mut session = session_for(&path);

        session.handle_line("BEGIN TRANSACTION");
        let (insert, closed) = session.handle_line("INSERT 7 1000 foo,bar");
        assert_eq!(insert, "ERROR: dato invalido: payload contains a comma or newline");
        assert!(!closed);

        // the transaction is still open; nothing was queued, so COMMIT is a no-op.
        let (commit, _) = session.handle_line("COMMIT TRANSACTION");
        assert_eq!(commit, "OK: Transaccion confirmada");

        let (select, _) = session.handle_line("SELECT 1");
        assert_eq!(select, "ERROR: No se encontro registro");

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(sibling_lock_path(&path));
    }

    #[test]
    fn update_with_comma_in_payload_is_rejected() {
        let path = tmp_path("update-comma");
        let _ = std::fs::remove_file(&path);
        let mut session = session_for(&path);

        session.handle_line("BEGIN TRANSACTION");
        session.handle_line("INSERT 7 1000 foo");
        session.handle_line("COMMIT TRANSACTION");

        session.handle_line("BEGIN TRANSACTION");
        let (update, closed) = session.handle_line("UPDATE 1 7 2000 bad,value");
        assert_eq!(update, "ERROR: dato invalido: payload contains a comma or newline");
        assert!(!closed);
        session.handle_line("ROLLBACK TRANSACTION");

        let (select, _) = session.handle_line("SELECT 1");
        assert_eq!(select, format!("RESULTADO:\n{HEADER_LINE}\n1,7,1000,foo\n"));

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(sibling_lock_path(&path));
    }

    #[test]
    fn rollback_discards_pending_ops() {
        let path = tmp_path("rollback");
        let _ = std::fs::remove_file(&path);
        let mut session = session_for(&path);

        session.handle_line("BEGIN TRANSACTION");
        session.handle_line("INSERT 7 1000 foo");
        let (rollback, _) = session.handle_line("ROLLBACK TRANSACTION");
        assert_eq!(rollback, "OK: Transaccion deshecha");

        let (select, _) = session.handle_line("SELECT 1");
        assert_eq!(select, "ERROR: No se encontro registro");

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(sibling_lock_path(&path));
    }

    #[test]
    fn unrecognized_command_does_not_change_state() {
        let path = tmp_path("unrecognized");
        let mut session = session_for(&path);
        let (response, closed) = session.handle_line("FROBNICATE");
        assert_eq!(response, "ERROR: Comando no reconocido");
        assert!(!closed);
    }
}
