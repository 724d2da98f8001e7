//! The record ring: a bounded circular buffer of completed records shared
//! between every generator (producer) and the coordinator (consumer)
//! (spec.md §4.3).

use std::time::Duration;

use ledger_sync::{SemaphoreArray, SemaphoreSetId, ShmRegion};

use crate::constants::{RECORD_BUFFER_SIZE, RECORD_RING_MAGIC};
use crate::error::Result;
use crate::protocol::{Record, RawRecord};

const RECORD_MUTEX: usize = 0;
const RECORD_AVAILABLE: usize = 1;
const RECORD_EMPTY: usize = 2;

const SEMAPHORE_PURPOSE: &str = "recring";

#[derive(Clone, Copy)]
#[repr(C)]
struct RawRing {
    read_index: u32,
    write_index: u32,
    count: u32,
    slots: [RawRecord; RECORD_BUFFER_SIZE],
}

impl RawRing {
    fn empty() -> Self {
        Self { read_index: 0, write_index: 0, count: 0, slots: [RawRecord::empty(); RECORD_BUFFER_SIZE] }
    }
}

/// One end of the record ring. Every generator holds a producer handle;
/// the coordinator holds the sole consumer handle.
pub struct RecordRing {
    sems: SemaphoreArray,
    region: ShmRegion<RawRing>,
}

impl RecordRing {
    /// Create the ring's semaphores (`RECORD_EMPTY` starts at capacity,
    /// matching spec.md §4.3) and its shared memory region.
    pub fn create(id: SemaphoreSetId, shm_path: &str) -> Result<Self> {
        let sems =
            SemaphoreArray::create(SEMAPHORE_PURPOSE, id, &[1, 0, RECORD_BUFFER_SIZE as u32])?;
        let region = ShmRegion::create(shm_path, RECORD_RING_MAGIC, RawRing::empty())?;
        Ok(Self { sems, region })
    }

    /// Attach to a ring previously created by [`RecordRing::create`].
    pub fn open(id: SemaphoreSetId, shm_path: &str) -> Result<Self> {
        let sems = SemaphoreArray::open(SEMAPHORE_PURPOSE, id, 3)?;
        let region = ShmRegion::open(shm_path, RECORD_RING_MAGIC)?;
        Ok(Self { sems, region })
    }

    /// Producer side: enqueue `record`, blocking while the ring is full
    /// (spec.md §4.3: "producer blocks when full").
    pub fn push(&mut self, record: &Record) -> Result<()> {
        self.sems.wait(RECORD_EMPTY)?;
        self.sems.wait(RECORD_MUTEX)?;
        unsafe {
            let ring = self.region.get_mut();
            let index = ring.write_index as usize;
            ring.slots[index] = record.into();
            ring.write_index = (index as u32 + 1) % RECORD_BUFFER_SIZE as u32;
            ring.count += 1;
        }
        self.sems.post(RECORD_MUTEX)?;
        self.sems.post(RECORD_AVAILABLE)?;
        Ok(())
    }

    /// Consumer side, non-blocking: dequeue one record if any is currently
    /// available.
    pub fn try_pop(&mut self) -> Result<Option<Record>> {
        if !self.sems.try_wait(RECORD_AVAILABLE)? {
            return Ok(None);
        }
        Ok(Some(self.pop_locked()?))
    }

    /// Consumer side: wait up to `timeout` for a record to become
    /// available, then dequeue it.
    pub fn wait_and_pop_timeout(&mut self, timeout: Duration) -> Result<Option<Record>> {
        if !self.sems.wait_timeout(RECORD_AVAILABLE, timeout)? {
            return Ok(None);
        }
        Ok(Some(self.pop_locked()?))
    }

    fn pop_locked(&mut self) -> Result<Record> {
        self.sems.wait(RECORD_MUTEX)?;
        let record = unsafe {
            let ring = self.region.get_mut();
            let index = ring.read_index as usize;
            let raw = ring.slots[index];
            ring.read_index = (index as u32 + 1) % RECORD_BUFFER_SIZE as u32;
            ring.count -= 1;
            raw
        };
        self.sems.post(RECORD_MUTEX)?;
        self.sems.post(RECORD_EMPTY)?;
        Ok(record.into())
    }

    /// Path to the shared memory backing file, for coordinator cleanup.
    pub fn shm_path(&self) -> &str {
        self.region.path()
    }

    /// Remove the backing shared memory file. Coordinator-only.
    pub fn remove_backing_file(&self) -> std::io::Result<()> {
        self.region.remove_backing_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ledger-gen-ring-test-{name}-{}", rand::random::<u32>()))
    }

    #[test]
    fn push_then_pop_preserves_fifo_order() {
        let id = rand::random();
        let path = tmp_path("fifo");
        let mut producer = RecordRing::create(id, path.to_str().unwrap()).unwrap();
        let mut consumer = RecordRing::open(id, path.to_str().unwrap()).unwrap();

        producer.push(&Record { id: 1, producer_pid: 1, timestamp: 0, payload: "a".into() }).unwrap();
        producer.push(&Record { id: 2, producer_pid: 1, timestamp: 0, payload: "b".into() }).unwrap();

        let first = consumer.try_pop().unwrap().unwrap();
        let second = consumer.try_pop().unwrap().unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(consumer.try_pop().unwrap(), None);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn pop_times_out_when_empty() {
        let id = rand::random();
        let path = tmp_path("timeout");
        let mut consumer = RecordRing::create(id, path.to_str().unwrap()).unwrap();
        let popped = consumer.wait_and_pop_timeout(Duration::from_millis(50)).unwrap();
        assert!(popped.is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn ring_wraps_around_capacity() {
        let id = rand::random();
        let path = tmp_path("wrap");
        let mut producer = RecordRing::create(id, path.to_str().unwrap()).unwrap();
        let mut consumer = RecordRing::open(id, path.to_str().unwrap()).unwrap();

        for round in 0..(RECORD_BUFFER_SIZE as u64 * 2) {
            producer
                .push(&Record { id: round, producer_pid: 1, timestamp: 0, payload: "x".into() })
                .unwrap();
            let popped = consumer.try_pop().unwrap().unwrap();
            assert_eq!(popped.id, round);
        }

        let _ = std::fs::remove_file(&path);
    }
}
