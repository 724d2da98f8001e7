//! Error types for the transactional CSV server.

use thiserror::Error;

/// Result type alias for `ledger-txn` operations.
pub type Result<T> = std::result::Result<T, TxnError>;

/// Everything that can go wrong running Core B.
#[derive(Error, Debug)]
pub enum TxnError {
    /// I/O errors from socket, file, or lock operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A CSV row read from disk or sent by a client failed to parse.
    #[error(transparent)]
    Csv(#[from] ledger_csv::CsvParseError),

    /// `max_concurrent` / `max_waiting` failed CLI validation (spec.md §6).
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// `bind`/`listen` on the configured host/port failed.
    #[error("failed to bind {host}:{port}: {source}")]
    Bind {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// `fork(2)` failed while spawning a client session.
    #[error("failed to fork client session: {0}")]
    Fork(nix::Error),
}
