//! The transaction lock: an advisory whole-file exclusive lock acquired
//! non-blockingly on BEGIN and held for the life of a transaction (spec.md
//! §4.10).
//!
//! Backed by `flock(2)` on a dedicated sentinel file (not the data CSV
//! itself, so a lock attempt never contends with the CSV Mutator's own
//! rewrite-and-rename). `flock` locks belong to the open file description,
//! so each session process must open its own fresh descriptor here rather
//! than inherit one - that is what makes the lock genuinely
//! process-exclusive rather than shared across a `fork`.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Attempts a non-blocking exclusive `flock` on the sentinel file at
/// `lock_path`. Returns `Ok(Some(guard))` if acquired, `Ok(None)` if some
/// other process already holds it.
pub fn try_acquire_exclusive(lock_path: impl AsRef<Path>) -> std::io::Result<Option<TransactionLock>> {
    let lock_path = lock_path.as_ref().to_path_buf();
    let file = OpenOptions::new().read(true).write(true).create(true).open(&lock_path)?;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(Some(TransactionLock { _file: file, path: lock_path }));
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::WouldBlock {
        return Ok(None);
    }
    Err(err)
}

/// Briefly acquires and immediately releases the lock, succeeding only if
/// it was free (spec.md §4.10: SELECT "attempts an exclusive non-blocking
/// try-lock; if it succeeds, releases immediately").
pub fn is_free(lock_path: impl AsRef<Path>) -> std::io::Result<bool> {
    Ok(try_acquire_exclusive(lock_path)?.is_some())
}

/// An exclusively held transaction lock. Released when dropped - either
/// explicitly (COMMIT/ROLLBACK/EXIT) or implicitly (process death, which
/// closes the descriptor and so releases the `flock`).
pub struct TransactionLock {
    _file: File,
    path: PathBuf,
}

impl TransactionLock {
    /// Path to the sentinel file this lock is held on.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
