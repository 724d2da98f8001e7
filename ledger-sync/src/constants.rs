//! Shared constants for the semaphore and shared-memory primitives.

/// Size in bytes reserved for a shared-memory region's header (one cache
/// line on essentially every target this crate runs on).
pub const HEADER_SIZE: usize = 64;

/// Format version stamped into every region header. Bump this if the
/// header layout changes so stale regions fail fast instead of being
/// misread.
pub const REGION_VERSION: u32 = 1;

/// Maximum length (including the leading `/`) of a POSIX semaphore name
/// this crate will construct. Linux enforces `NAME_MAX` (255) minus some
/// slack for the kernel's internal `/dev/shm/sem.` prefix; we stay well
/// under that.
pub const MAX_SEMAPHORE_NAME_LEN: usize = 200;
