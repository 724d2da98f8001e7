//! Named semaphores and file-backed shared memory for cross-process
//! coordination between a coordinator process and the worker processes it
//! spawns.
//!
//! This is the "Sync Primitives" leaf component (spec.md §4.1): a
//! semaphore array gives P/V/try-P/timed-P over a fixed set of named
//! counters, and a shared memory region gives a typed, cache-line-aligned
//! view over an `mmap(MAP_SHARED)` file that survives `fork`/`exec` by path
//! and identifier rather than by inherited file descriptor.

pub mod constants;
pub mod error;
pub mod semaphore;
pub mod shm;

pub use error::{Result, SyncError};
pub use semaphore::{SemaphoreArray, SemaphoreSetId};
pub use shm::ShmRegion;
