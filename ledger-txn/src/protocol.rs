//! The text wire protocol: one line per command, human-readable responses
//! (spec.md §6, §4.8).

/// Maximum number of pending operations a session may queue before it must
/// COMMIT or ROLLBACK (spec.md §4.8).
pub const MAX_PENDING_OPS: usize = 100;

/// One parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    BeginTransaction,
    CommitTransaction,
    RollbackTransaction,
    Select { id: u64 },
    Insert { producer_pid: u32, timestamp: i64, payload: String },
    Update { id: u64, producer_pid: u32, timestamp: i64, payload: String },
    Delete { id: u64 },
    Exit,
}

/// A command line that did not match any recognized command (spec.md §4.8:
/// "unrecognized -> `ERROR: Comando no reconocido`") or whose arguments
/// were malformed for the command it otherwise matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedCommand;

/// Parse one line of client input (without its trailing newline).
pub fn parse_command(line: &str) -> Result<Command, UnrecognizedCommand> {
    let line = line.trim();
    let mut parts = line.split(' ').filter(|s| !s.is_empty());
    let head = parts.next().ok_or(UnrecognizedCommand)?;

    match head {
        "BEGIN" => {
            expect_tokens(&mut parts, &["TRANSACTION"])?;
            Ok(Command::BeginTransaction)
        }
        "COMMIT" => {
            expect_tokens(&mut parts, &["TRANSACTION"])?;
            Ok(Command::CommitTransaction)
        }
        "ROLLBACK" => {
            expect_tokens(&mut parts, &["TRANSACTION"])?;
            Ok(Command::RollbackTransaction)
        }
        "EXIT" => {
            no_more_tokens(&mut parts)?;
            Ok(Command::Exit)
        }
        "SELECT" => {
            let id = next_u64(&mut parts)?;
            no_more_tokens(&mut parts)?;
            Ok(Command::Select { id })
        }
        "DELETE" => {
            let id = next_u64(&mut parts)?;
            no_more_tokens(&mut parts)?;
            Ok(Command::Delete { id })
        }
        "INSERT" => {
            let producer_pid = next_u32(&mut parts)?;
            let timestamp = next_i64(&mut parts)?;
            let payload = remaining_payload(&mut parts)?;
            Ok(Command::Insert { producer_pid, timestamp, payload })
        }
        "UPDATE" => {
            let id = next_u64(&mut parts)?;
            let producer_pid = next_u32(&mut parts)?;
            let timestamp = next_i64(&mut parts)?;
            let payload = remaining_payload(&mut parts)?;
            Ok(Command::Update { id, producer_pid, timestamp, payload })
        }
        _ => Err(UnrecognizedCommand),
    }
}

fn expect_tokens<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    expected: &[&str],
) -> Result<(), UnrecognizedCommand> {
    for token in expected {
        if parts.next() != Some(*token) {
            return Err(UnrecognizedCommand);
        }
    }
    no_more_tokens(parts)
}

fn no_more_tokens<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<(), UnrecognizedCommand> {
    match parts.next() {
        None => Ok(()),
        Some(_) => Err(UnrecognizedCommand),
    }
}

fn next_u64<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<u64, UnrecognizedCommand> {
    parts.next().and_then(|s| s.parse().ok()).ok_or(UnrecognizedCommand)
}

fn next_u32<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<u32, UnrecognizedCommand> {
    parts.next().and_then(|s| s.parse().ok()).ok_or(UnrecognizedCommand)
}

fn next_i64<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<i64, UnrecognizedCommand> {
    parts.next().and_then(|s| s.parse().ok()).ok_or(UnrecognizedCommand)
}

fn remaining_payload<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<String, UnrecognizedCommand> {
    let payload: Vec<&str> = parts.collect();
    if payload.is_empty() {
        return Err(UnrecognizedCommand);
    }
    Ok(payload.join(" "))
}

/// One mutation recorded in a session's transaction, not yet visible to
/// other readers (spec.md §3 `PendingOp`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOp {
    Insert { id: u64, producer_pid: u32, timestamp: i64, payload: String },
    Update { id: u64, producer_pid: u32, timestamp: i64, payload: String },
    Delete { id: u64 },
}

impl PendingOp {
    /// The row id this operation targets (the assigned id for `Insert`,
    /// the target id for `Update`/`Delete`).
    pub fn target_id(&self) -> u64 {
        match self {
            PendingOp::Insert { id, .. } => *id,
            PendingOp::Update { id, .. } => *id,
            PendingOp::Delete { id } => *id,
        }
    }
}
