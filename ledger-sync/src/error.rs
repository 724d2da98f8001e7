//! Error types for named semaphores and shared memory regions.

use thiserror::Error;

/// Result type alias for `ledger-sync` operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised by the semaphore and shared-memory primitives.
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O errors from file or mmap operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `sem_open` failed for the named semaphore.
    #[error("failed to open semaphore {name}: {source}")]
    SemaphoreOpen {
        /// Semaphore name passed to `sem_open`.
        name: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A shared memory region's header did not carry the expected magic
    /// number; the path does not hold a `ledger-sync` region.
    #[error("shared memory region {path} has wrong magic number")]
    WrongMagic {
        /// Path to the backing file.
        path: String,
    },

    /// A shared memory region's header version did not match this build.
    #[error("shared memory region {path}: version mismatch (expected {expected}, found {found})")]
    VersionMismatch {
        /// Path to the backing file.
        path: String,
        /// Version this build expects.
        expected: u32,
        /// Version found in the file.
        found: u32,
    },

    /// A shared memory region's payload size did not match the requested
    /// type's size - the file was created by a build with a different
    /// layout for `T`.
    #[error("shared memory region {path}: size mismatch (expected {expected}, found {found})")]
    SizeMismatch {
        /// Path to the backing file.
        path: String,
        /// Size this build expects, in bytes.
        expected: usize,
        /// Size found in the file, in bytes.
        found: usize,
    },

    /// Invalid configuration passed by the caller (e.g. zero-length
    /// semaphore array).
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the invalid configuration.
        message: String,
    },
}

impl SyncError {
    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }
}
