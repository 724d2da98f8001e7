//! File-backed shared memory regions, used for the request slot (§4.2) and
//! the record ring (§4.3).
//!
//! This adapts the header-then-payload `mmap(MAP_SHARED)` layout of
//! `SharedRingBuffer` (a file-backed, cross-process ring buffer) to a
//! single fixed-size payload of type `T`: a small cache-line-aligned header
//! carries a magic number, a format version, and the payload size so a
//! consumer opening the region fails fast instead of misreading a stale or
//! foreign file, and the payload itself follows immediately after.
//!
//! Unlike the disruptor ring buffers this pattern is drawn from, access to
//! the payload here is *not* lock-free: every read or write must happen
//! while the caller holds the appropriate semaphore from a `SemaphoreArray`
//! (the `unsafe` on `get`/`get_mut` is the reminder of that contract).

use std::fs::{File, OpenOptions};
use std::io;
use std::marker::PhantomData;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::constants::{HEADER_SIZE, REGION_VERSION};
use crate::error::{Result, SyncError};

#[repr(C, align(64))]
struct RegionHeader {
    magic: u64,
    version: u32,
    payload_size: u32,
    _pad: [u8; HEADER_SIZE - 16],
}

/// A file-backed shared memory region holding exactly one `T`.
///
/// `T` must be `Copy` (plain-old-data): it is placed directly into a
/// memory-mapped file and read/written with `ptr::read_volatile` /
/// `ptr::write_volatile`, so it must not contain anything that assumes a
/// single owning process (no `Box`, no non-shared-memory pointers).
pub struct ShmRegion<T: Copy> {
    mmap_ptr: *mut u8,
    mmap_len: usize,
    path: String,
    _file: File,
    _phantom: PhantomData<T>,
}

impl<T: Copy> ShmRegion<T> {
    /// Create a new region at `path`, truncating any existing file, and
    /// initialize the payload to `initial`.
    pub fn create<P: AsRef<Path>>(path: P, magic: u64, initial: T) -> Result<Self> {
        let path_str = path.as_ref().display().to_string();
        let payload_size = std::mem::size_of::<T>();
        let file_size = HEADER_SIZE + payload_size;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(file_size as u64)?;

        let mmap_ptr = map_file(&file, file_size)?;

        unsafe {
            let header = &mut *(mmap_ptr as *mut RegionHeader);
            header.magic = magic;
            header.version = REGION_VERSION;
            header.payload_size = payload_size as u32;

            let payload_ptr = mmap_ptr.add(HEADER_SIZE) as *mut T;
            std::ptr::write_volatile(payload_ptr, initial);

            libc::msync(mmap_ptr as *mut _, file_size, libc::MS_SYNC);
        }

        Ok(Self { mmap_ptr, mmap_len: file_size, path: path_str, _file: file, _phantom: PhantomData })
    }

    /// Attach to an existing region created by `create` with the same
    /// `magic` and payload type.
    pub fn open<P: AsRef<Path>>(path: P, magic: u64) -> Result<Self> {
        let path_str = path.as_ref().display().to_string();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_size = file.metadata()?.len() as usize;
        if file_size < HEADER_SIZE {
            return Err(SyncError::WrongMagic { path: path_str });
        }

        let mmap_ptr = map_file(&file, file_size)?;

        let header = unsafe { &*(mmap_ptr as *const RegionHeader) };
        if header.magic != magic {
            unsafe { libc::munmap(mmap_ptr as *mut _, file_size) };
            return Err(SyncError::WrongMagic { path: path_str });
        }
        if header.version != REGION_VERSION {
            let found = header.version;
            unsafe { libc::munmap(mmap_ptr as *mut _, file_size) };
            return Err(SyncError::VersionMismatch { path: path_str, expected: REGION_VERSION, found });
        }
        let expected_payload = std::mem::size_of::<T>();
        if header.payload_size as usize != expected_payload {
            let found = header.payload_size as usize;
            unsafe { libc::munmap(mmap_ptr as *mut _, file_size) };
            return Err(SyncError::SizeMismatch { path: path_str, expected: expected_payload, found });
        }

        Ok(Self { mmap_ptr, mmap_len: file_size, path: path_str, _file: file, _phantom: PhantomData })
    }

    fn payload_ptr(&self) -> *const T {
        unsafe { self.mmap_ptr.add(HEADER_SIZE) as *const T }
    }

    fn payload_mut_ptr(&mut self) -> *mut T {
        unsafe { self.mmap_ptr.add(HEADER_SIZE) as *mut T }
    }

    /// Read the current payload.
    ///
    /// # Safety
    /// Caller must hold whatever semaphore protects this region before
    /// calling, so the read is not racing a concurrent writer.
    pub unsafe fn read(&self) -> T {
        std::ptr::read_volatile(self.payload_ptr())
    }

    /// Overwrite the payload.
    ///
    /// # Safety
    /// Caller must hold whatever semaphore protects this region before
    /// calling.
    pub unsafe fn write(&mut self, value: T) {
        std::ptr::write_volatile(self.payload_mut_ptr(), value);
    }

    /// Borrow the payload in place for an in-place mutation (e.g. updating
    /// one field of a larger struct without a full read-modify-write).
    ///
    /// # Safety
    /// Caller must hold whatever semaphore protects this region, and must
    /// not let the reference outlive the critical section.
    pub unsafe fn get_mut(&mut self) -> &mut T {
        &mut *self.payload_mut_ptr()
    }

    /// Path to the backing file, useful for logging and cleanup.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Remove the backing file. Only the creator should call this, and
    /// only after all other attachments have exited - mirrors the
    /// coordinator's responsibility for shared memory cleanup in spec.md §5.
    pub fn remove_backing_file(&self) -> io::Result<()> {
        std::fs::remove_file(&self.path)
    }
}

fn map_file(file: &File, len: usize) -> Result<*mut u8> {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            file.as_raw_fd(),
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(SyncError::Io(io::Error::last_os_error()));
    }
    Ok(ptr as *mut u8)
}

impl<T: Copy> Drop for ShmRegion<T> {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.mmap_ptr as *mut _, self.mmap_len);
        }
    }
}

// The region is only ever dereferenced under external semaphore
// protection; the pointer itself is safe to hand across the process
// boundary that MAP_SHARED already crosses.
unsafe impl<T: Copy> Send for ShmRegion<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, PartialEq)]
    #[repr(C)]
    struct Counters {
        a: i64,
        b: i64,
    }

    fn tmp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ledger-sync-shm-test-{name}-{}", rand::random::<u32>()))
    }

    #[test]
    fn create_then_open_sees_initial_value() {
        let path = tmp_path("roundtrip");
        let region = ShmRegion::create(&path, 0xABCD, Counters { a: 1, b: 2 }).unwrap();
        let opened: ShmRegion<Counters> = ShmRegion::open(&path, 0xABCD).unwrap();
        unsafe {
            assert_eq!(opened.read(), Counters { a: 1, b: 2 });
        }
        drop(region);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn write_is_visible_to_other_handle() {
        let path = tmp_path("write-visible");
        let mut creator = ShmRegion::create(&path, 0x1111, Counters { a: 0, b: 0 }).unwrap();
        let opener: ShmRegion<Counters> = ShmRegion::open(&path, 0x1111).unwrap();

        unsafe {
            creator.write(Counters { a: 42, b: 7 });
            assert_eq!(opener.read(), Counters { a: 42, b: 7 });
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn open_rejects_wrong_magic() {
        let path = tmp_path("wrong-magic");
        let _region = ShmRegion::create(&path, 0x1234, Counters { a: 0, b: 0 }).unwrap();
        let opened: Result<ShmRegion<Counters>> = ShmRegion::open(&path, 0x9999);
        assert!(matches!(opened, Err(SyncError::WrongMagic { .. })));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn open_rejects_size_mismatch() {
        #[derive(Copy, Clone)]
        #[repr(C)]
        struct Bigger {
            _a: i64,
            _b: i64,
            _c: i64,
        }

        let path = tmp_path("size-mismatch");
        let _region = ShmRegion::create(&path, 0x5555, Counters { a: 0, b: 0 }).unwrap();
        let opened: Result<ShmRegion<Bigger>> = ShmRegion::open(&path, 0x5555);
        assert!(matches!(opened, Err(SyncError::SizeMismatch { .. })));
        let _ = std::fs::remove_file(&path);
    }
}
