//! The request channel: a single-slot rendezvous carrying ID requests from
//! any generator to the coordinator and the reply back (spec.md §4.2).

use std::time::Duration;

use ledger_sync::{SemaphoreArray, SemaphoreSetId, ShmRegion};

use crate::constants::REQUEST_SLOT_MAGIC;
use crate::error::Result;
use crate::protocol::{IdRequestMsg, RawRequestSlot};

const REQUEST_TURN: usize = 0;
const REQUEST_MUTEX: usize = 1;
const REQUEST_AVAILABLE: usize = 2;
const REQUEST_DONE: usize = 3;

const SEMAPHORE_PURPOSE: &str = "reqchan";

/// One end of the request channel. The coordinator and every generator each
/// hold their own `RequestChannel`, attached to the same semaphore set and
/// shared memory region by `id`.
pub struct RequestChannel {
    sems: SemaphoreArray,
    slot: ShmRegion<RawRequestSlot>,
}

impl RequestChannel {
    /// Create the channel's semaphores and shared memory region. Called
    /// once, by the coordinator, before any generator is spawned.
    pub fn create(id: SemaphoreSetId, shm_path: &str) -> Result<Self> {
        let sems = SemaphoreArray::create(SEMAPHORE_PURPOSE, id, &[1, 1, 0, 0])?;
        let slot = ShmRegion::create(shm_path, REQUEST_SLOT_MAGIC, RawRequestSlot::empty())?;
        Ok(Self { sems, slot })
    }

    /// Attach to a channel previously created by [`RequestChannel::create`].
    /// Called by every generator, using the identifier and shared memory
    /// path handed to it on the command line (spec.md §6).
    pub fn open(id: SemaphoreSetId, shm_path: &str) -> Result<Self> {
        let sems = SemaphoreArray::open(SEMAPHORE_PURPOSE, id, 4)?;
        let slot = ShmRegion::open(shm_path, REQUEST_SLOT_MAGIC)?;
        Ok(Self { sems, slot })
    }

    /// Generator side: the full six-step protocol from spec.md §4.2,
    /// blocking until the coordinator replies.
    pub fn request_ids(&mut self, requester_pid: u32) -> Result<IdRequestMsg> {
        self.sems.wait(REQUEST_TURN)?;

        self.sems.wait(REQUEST_MUTEX)?;
        unsafe { self.slot.write(IdRequestMsg::Request { requester_pid }.into()) };
        self.sems.post(REQUEST_MUTEX)?;

        self.sems.post(REQUEST_AVAILABLE)?;
        self.sems.wait(REQUEST_DONE)?;

        self.sems.wait(REQUEST_MUTEX)?;
        let raw = unsafe { self.slot.read() };
        self.sems.post(REQUEST_MUTEX)?;

        self.sems.post(REQUEST_TURN)?;
        Ok(raw.into())
    }

    /// Coordinator side, non-blocking: if a request is currently pending,
    /// take and return the requester's pid without waiting.
    pub fn try_take_request(&mut self) -> Result<Option<u32>> {
        if !self.sems.try_wait(REQUEST_AVAILABLE)? {
            return Ok(None);
        }
        Ok(Some(self.read_requester_pid()?))
    }

    /// Coordinator side: wait up to `timeout` for a new request, returning
    /// the requester's pid if one arrived in time.
    pub fn wait_and_take_request_timeout(&mut self, timeout: Duration) -> Result<Option<u32>> {
        if !self.sems.wait_timeout(REQUEST_AVAILABLE, timeout)? {
            return Ok(None);
        }
        Ok(Some(self.read_requester_pid()?))
    }

    fn read_requester_pid(&mut self) -> Result<u32> {
        self.sems.wait(REQUEST_MUTEX)?;
        let raw = unsafe { self.slot.read() };
        self.sems.post(REQUEST_MUTEX)?;
        match IdRequestMsg::from(raw) {
            IdRequestMsg::Request { requester_pid } => Ok(requester_pid),
            // Only a generator ever posts REQUEST_AVAILABLE, and only after
            // writing a Request variant under the mutex, so this is
            // unreachable in practice; fall back to pid 0 rather than panic.
            _ => Ok(0),
        }
    }

    /// Coordinator side: write a reply into the slot and wake the
    /// requesting generator.
    pub fn reply(&mut self, reply: IdRequestMsg) -> Result<()> {
        self.sems.wait(REQUEST_MUTEX)?;
        unsafe { self.slot.write(reply.into()) };
        self.sems.post(REQUEST_MUTEX)?;
        self.sems.post(REQUEST_DONE)?;
        Ok(())
    }

    /// Path to the shared memory backing file, for coordinator cleanup.
    pub fn shm_path(&self) -> &str {
        self.slot.path()
    }

    /// Remove the backing shared memory file. Coordinator-only, called
    /// after every generator has exited.
    pub fn remove_backing_file(&self) -> std::io::Result<()> {
        self.slot.remove_backing_file()
    }
}
