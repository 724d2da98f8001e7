//! Error types for the generator coordinator and generator worker.

use thiserror::Error;

/// Result type alias for `ledger-gen` operations.
pub type Result<T> = std::result::Result<T, GenError>;

/// Everything that can go wrong running Core A.
#[derive(Error, Debug)]
pub enum GenError {
    /// Errors from the underlying semaphore/shared-memory primitives.
    #[error(transparent)]
    Sync(#[from] ledger_sync::SyncError),

    /// A record arriving at the writer could not be turned into a `CsvRow`.
    #[error(transparent)]
    Csv(#[from] ledger_csv::CsvParseError),

    /// I/O errors opening or writing the output CSV.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `total_records` / `num_generators` failed CLI validation (spec.md §6:
    /// both positive, `num_generators <= total_records`).
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// Spawning a generator child process failed.
    #[error("failed to spawn generator: {0}")]
    Spawn(std::io::Error),
}
