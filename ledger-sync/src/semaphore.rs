//! Named POSIX semaphores used as the P/V primitives behind the request
//! channel (§4.2) and the record ring (§4.3).
//!
//! A `SemaphoreArray` is a fixed-size collection of named semaphores
//! (`sem_open(2)`) all sharing a numeric identifier, so a generator process
//! can re-derive the same kernel objects the coordinator created just from
//! that identifier plus its index in the array - mirroring the "semaphore
//! identifier" handed to generators on the command line in spec.md §6.
//!
//! Every wait retries across `EINTR`, since `sem_wait`/`sem_timedwait` can
//! be interrupted by a delivered signal (SIGCHLD in particular, since the
//! coordinator reaps children via a handler) without the wait itself having
//! failed.

use std::ffi::CString;
use std::time::Duration;

use crate::constants::MAX_SEMAPHORE_NAME_LEN;
use crate::error::{Result, SyncError};

/// Opaque identifier shared between a coordinator and the generator
/// processes it spawns, used to name the semaphore set. Two coordinator
/// runs never collide because the id is derived from the coordinator's own
/// pid plus a random salt (see `SemaphoreArray::fresh_id`).
pub type SemaphoreSetId = u32;

/// A single named POSIX semaphore.
struct NamedSemaphore {
    name: CString,
    handle: *mut libc::sem_t,
    /// Whether this process created the semaphore (and so is responsible
    /// for `sem_unlink`ing it on teardown).
    owner: bool,
}

// `sem_t*` from sem_open is safe to use across threads; the kernel
// serializes access to the underlying semaphore object.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    fn create(name: &str, initial_value: u32) -> Result<Self> {
        let cname = semaphore_name_to_cstring(name)?;
        let handle = unsafe {
            libc::sem_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o600u32,
                initial_value,
            )
        };
        if handle == libc::SEM_FAILED {
            return Err(SyncError::SemaphoreOpen {
                name: name.to_string(),
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(Self { name: cname, handle, owner: true })
    }

    fn open(name: &str) -> Result<Self> {
        let cname = semaphore_name_to_cstring(name)?;
        let handle = unsafe { libc::sem_open(cname.as_ptr(), 0) };
        if handle == libc::SEM_FAILED {
            return Err(SyncError::SemaphoreOpen {
                name: name.to_string(),
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(Self { name: cname, handle, owner: false })
    }

    /// Blocking P(): decrement, waiting if the count is zero. Restarts
    /// transparently across `EINTR`.
    fn wait(&self) -> Result<()> {
        loop {
            let rc = unsafe { libc::sem_wait(self.handle) };
            if rc == 0 {
                return Ok(());
            }
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(SyncError::SemaphoreOpen { name: self.display_name(), source: err });
        }
    }

    /// V(): increment, waking one waiter if any are blocked.
    fn post(&self) -> Result<()> {
        let rc = unsafe { libc::sem_post(self.handle) };
        if rc != 0 {
            return Err(SyncError::SemaphoreOpen {
                name: self.display_name(),
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    /// Non-blocking try-P(): returns `Ok(true)` if the decrement succeeded,
    /// `Ok(false)` if the semaphore was at zero (`EAGAIN`).
    fn try_wait(&self) -> Result<bool> {
        loop {
            let rc = unsafe { libc::sem_trywait(self.handle) };
            if rc == 0 {
                return Ok(true);
            }
            let err = std::io::Error::last_os_error();
            match err.kind() {
                std::io::ErrorKind::Interrupted => continue,
                std::io::ErrorKind::WouldBlock => return Ok(false),
                _ => return Err(SyncError::SemaphoreOpen { name: self.display_name(), source: err }),
            }
        }
    }

    /// Time-bounded P(): returns `Ok(true)` if acquired before `timeout`
    /// elapsed, `Ok(false)` on timeout.
    fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        let deadline = unsafe {
            let mut now = std::mem::zeroed::<libc::timespec>();
            libc::clock_gettime(libc::CLOCK_REALTIME, &mut now);
            let mut ts = now;
            ts.tv_sec += timeout.as_secs() as libc::time_t;
            ts.tv_nsec += timeout.subsec_nanos() as i64;
            if ts.tv_nsec >= 1_000_000_000 {
                ts.tv_sec += 1;
                ts.tv_nsec -= 1_000_000_000;
            }
            ts
        };

        loop {
            let rc = unsafe { libc::sem_timedwait(self.handle, &deadline) };
            if rc == 0 {
                return Ok(true);
            }
            let err = std::io::Error::last_os_error();
            match err.kind() {
                std::io::ErrorKind::Interrupted => continue,
                std::io::ErrorKind::TimedOut => return Ok(false),
                _ if err.raw_os_error() == Some(libc::ETIMEDOUT) => return Ok(false),
                _ => return Err(SyncError::SemaphoreOpen { name: self.display_name(), source: err }),
            }
        }
    }

    fn display_name(&self) -> String {
        self.name.to_string_lossy().into_owned()
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.handle);
            if self.owner {
                libc::sem_unlink(self.name.as_ptr());
            }
        }
    }
}

fn semaphore_name_to_cstring(name: &str) -> Result<CString> {
    if name.len() > MAX_SEMAPHORE_NAME_LEN {
        return Err(SyncError::config(format!("semaphore name too long: {name}")));
    }
    CString::new(name).map_err(|_| SyncError::config("semaphore name contains NUL byte"))
}

/// A fixed-size array of named semaphores sharing one identifier, indexed
/// the way spec.md §4.2/§4.3 index their counters (`REQUEST_TURN`,
/// `RECORD_MUTEX`, ...).
pub struct SemaphoreArray {
    id: SemaphoreSetId,
    purpose: &'static str,
    semaphores: Vec<NamedSemaphore>,
}

impl SemaphoreArray {
    /// Generate a fresh identifier for a new coordinator run, combining the
    /// calling process's pid with a random salt so concurrent coordinator
    /// runs on the same host never collide on semaphore names.
    pub fn fresh_id() -> SemaphoreSetId {
        use std::time::{SystemTime, UNIX_EPOCH};
        let pid = std::process::id();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        pid ^ nanos.rotate_left(11)
    }

    /// Create a brand-new set of `initial_values.len()` named semaphores,
    /// each initialized to the corresponding entry. Fails (and cleans up
    /// any semaphores already created in this call) if any name is already
    /// taken, which would indicate an id collision.
    pub fn create(purpose: &'static str, id: SemaphoreSetId, initial_values: &[u32]) -> Result<Self> {
        if initial_values.is_empty() {
            return Err(SyncError::config("semaphore array must have at least one counter"));
        }

        let mut semaphores = Vec::with_capacity(initial_values.len());
        for (index, &value) in initial_values.iter().enumerate() {
            let name = semaphore_name(purpose, id, index);
            match NamedSemaphore::create(&name, value) {
                Ok(sem) => semaphores.push(sem),
                Err(err) => {
                    // semaphores already pushed unlink themselves on drop
                    return Err(err);
                }
            }
        }

        tracing::debug!(purpose, id, count = semaphores.len(), "created semaphore array");
        Ok(Self { id, purpose, semaphores })
    }

    /// Open a semaphore array previously created by `create` with the same
    /// `purpose`, `id`, and `count`. Does not take ownership for unlinking;
    /// only the creator removes the kernel objects.
    pub fn open(purpose: &'static str, id: SemaphoreSetId, count: usize) -> Result<Self> {
        let mut semaphores = Vec::with_capacity(count);
        for index in 0..count {
            let name = semaphore_name(purpose, id, index);
            semaphores.push(NamedSemaphore::open(&name)?);
        }
        Ok(Self { id, purpose, semaphores })
    }

    /// The identifier this array was created or opened with.
    pub fn id(&self) -> SemaphoreSetId {
        self.id
    }

    /// Blocking P() on counter `index`.
    pub fn wait(&self, index: usize) -> Result<()> {
        self.semaphores[index].wait()
    }

    /// V() on counter `index`.
    pub fn post(&self, index: usize) -> Result<()> {
        self.semaphores[index].post()
    }

    /// Non-blocking try-P() on counter `index`.
    pub fn try_wait(&self, index: usize) -> Result<bool> {
        self.semaphores[index].try_wait()
    }

    /// Time-bounded P() on counter `index`.
    pub fn wait_timeout(&self, index: usize, timeout: Duration) -> Result<bool> {
        self.semaphores[index].wait_timeout(timeout)
    }
}

fn semaphore_name(purpose: &str, id: SemaphoreSetId, index: usize) -> String {
    format!("/ledger-{purpose}-{id:x}-{index}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn rand_id() -> SemaphoreSetId {
        rand::random()
    }

    #[test]
    fn create_then_wait_post_roundtrip() {
        let id = rand_id();
        let set = SemaphoreArray::create("test-roundtrip", id, &[1, 0]).unwrap();

        set.wait(0).unwrap(); // counter starts at 1, should not block
        assert!(!set.try_wait(0).unwrap()); // now at 0

        set.post(1).unwrap();
        set.wait(1).unwrap(); // should not block, was just posted
    }

    #[test]
    fn try_wait_does_not_block_when_zero() {
        let id = rand_id();
        let set = SemaphoreArray::create("test-trywait", id, &[0]).unwrap();
        assert!(!set.try_wait(0).unwrap());
    }

    #[test]
    fn wait_timeout_returns_false_on_timeout() {
        let id = rand_id();
        let set = SemaphoreArray::create("test-timeout", id, &[0]).unwrap();
        let acquired = set.wait_timeout(0, Duration::from_millis(50)).unwrap();
        assert!(!acquired);
    }

    #[test]
    fn wait_timeout_returns_true_when_available() {
        let id = rand_id();
        let set = SemaphoreArray::create("test-timeout-ok", id, &[1]).unwrap();
        let acquired = set.wait_timeout(0, Duration::from_millis(50)).unwrap();
        assert!(acquired);
    }

    #[test]
    fn open_attaches_to_existing_array() {
        let id = rand_id();
        let creator = SemaphoreArray::create("test-open", id, &[0, 0]).unwrap();
        let opener = SemaphoreArray::open("test-open", id, 2).unwrap();

        opener.post(0).unwrap();
        creator.wait(0).unwrap(); // should observe the opener's post
    }

    #[test]
    fn create_rejects_empty_array() {
        let id = rand_id();
        let err = SemaphoreArray::create("test-empty", id, &[]);
        assert!(err.is_err());
    }
}
