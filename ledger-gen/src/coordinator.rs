//! The coordinator: spawns generators, serves id requests, drains the
//! record ring, writes the ordered CSV, reaps children, and terminates
//! cleanly (spec.md §4.6).

use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;

use ledger_sync::SemaphoreSetId;

use crate::constants::{IDLE_WAIT_SLICE_MS, ID_BLOCK_SIZE};
use crate::error::{GenError, Result};
use crate::protocol::IdRequestMsg;
use crate::record_ring::RecordRing;
use crate::request_channel::RequestChannel;
use crate::shutdown;
use crate::writer::OrderedCsvWriter;

/// Shared-memory file paths are derived from the run's `channel_id` so the
/// two integer arguments handed to a generator (spec.md §6: "the
/// shared-memory identifier and the semaphore-array identifier") are enough
/// for it to re-derive both channels without any extra path argument.
pub fn request_shm_path(channel_id: SemaphoreSetId) -> PathBuf {
    std::env::temp_dir().join(format!("ledger-reqslot-{channel_id:x}.shm"))
}

/// See [`request_shm_path`].
pub fn ring_shm_path(channel_id: SemaphoreSetId) -> PathBuf {
    std::env::temp_dir().join(format!("ledger-recring-{channel_id:x}.shm"))
}

/// Outcome of a completed coordinator run (spec.md §8 end-to-end scenario
/// 2: "coordinator reports `Registros escritos: X/100`").
pub struct RunReport {
    /// Rows actually written to the CSV.
    pub records_written: u64,
    /// Total requested on the command line.
    pub total_records: u64,
}

/// Runs the whole Core A lifecycle: spawns `num_generators` generator
/// children, services them until every id is written or every generator has
/// died, then cleans up shared resources.
pub fn run(total_records: u64, num_generators: u64, output_csv: &str, generator_bin: &std::path::Path) -> Result<RunReport> {
    let channel_id = ledger_sync::SemaphoreArray::fresh_id();
    let request_path = request_shm_path(channel_id);
    let ring_path = ring_shm_path(channel_id);

    let mut requests = RequestChannel::create(channel_id, request_path.to_str().unwrap())?;
    let mut ring = RecordRing::create(channel_id, ring_path.to_str().unwrap())?;
    let mut writer = OrderedCsvWriter::create(output_csv, total_records)?;

    let mut children = spawn_generators(num_generators, channel_id, generator_bin)?;
    tracing::info!(total_records, num_generators, channel_id, "coordinator started");

    let mut next_assign_id = 1u64;
    let mut ids_assigned = 0u64;

    loop {
        reap_finished_children(&mut children);

        let mut did_work = false;
        while let Some(record) = ring.try_pop()? {
            writer.ingest(record)?;
            did_work = true;
        }

        if let Some(_requester_pid) = requests.try_take_request()? {
            let reply = next_assignment(&mut next_assign_id, &mut ids_assigned, total_records);
            requests.reply(reply)?;
            did_work = true;
        }

        let no_active_children = children.is_empty();
        if (writer.is_complete() && ids_assigned >= total_records && no_active_children)
            || (no_active_children && shutdown::requested())
        {
            break;
        }
        if no_active_children && !writer.is_complete() {
            // Every generator has exited (or died) and nothing more will
            // ever be enqueued; stop waiting for records that cannot come.
            break;
        }

        if shutdown::requested() {
            terminate_children(&mut children);
            continue;
        }

        if !did_work {
            idle_wait(&mut ring, &mut requests, &mut writer, &mut next_assign_id, &mut ids_assigned, total_records)?;
        }
    }

    for child in &mut children {
        let _ = child.wait();
    }

    requests.remove_backing_file().ok();
    ring.remove_backing_file().ok();

    let report = RunReport { records_written: writer.written(), total_records };
    tracing::info!(records_written = report.records_written, total_records, "coordinator finished");
    Ok(report)
}

fn next_assignment(next_assign_id: &mut u64, ids_assigned: &mut u64, total_records: u64) -> IdRequestMsg {
    let remaining = total_records.saturating_sub(*ids_assigned);
    let batch = remaining.min(ID_BLOCK_SIZE);
    if batch == 0 {
        return IdRequestMsg::NoMoreIds;
    }
    let start = *next_assign_id;
    let end = start + batch - 1;
    *next_assign_id = end + 1;
    *ids_assigned += batch;
    IdRequestMsg::Assign { start, end }
}

/// One bounded-wait slice (spec.md §4.6: "blocks on either the
/// record-available or request-available counter with a timeout (~200ms)"):
/// wait half the slice on the ring, then half on the request channel,
/// servicing whichever woke first.
fn idle_wait(
    ring: &mut RecordRing,
    requests: &mut RequestChannel,
    writer: &mut OrderedCsvWriter,
    next_assign_id: &mut u64,
    ids_assigned: &mut u64,
    total_records: u64,
) -> Result<()> {
    let slice = Duration::from_millis(IDLE_WAIT_SLICE_MS);
    if let Some(record) = ring.wait_and_pop_timeout(slice)? {
        writer.ingest(record)?;
        return Ok(());
    }
    if let Some(_requester_pid) = requests.wait_and_take_request_timeout(slice)? {
        let reply = next_assignment(next_assign_id, ids_assigned, total_records);
        requests.reply(reply)?;
    }
    Ok(())
}

fn spawn_generators(count: u64, channel_id: SemaphoreSetId, generator_bin: &std::path::Path) -> Result<Vec<Child>> {
    let mut children = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let child = Command::new(generator_bin)
            .arg(channel_id.to_string())
            .arg(channel_id.to_string())
            .spawn()
            .map_err(GenError::Spawn)?;
        children.push(child);
    }
    Ok(children)
}

fn reap_finished_children(children: &mut Vec<Child>) {
    children.retain_mut(|child| match child.try_wait() {
        Ok(Some(status)) => {
            if !status.success() {
                tracing::warn!(?status, "generator exited non-zero");
            }
            false
        }
        Ok(None) => true,
        Err(err) => {
            tracing::warn!(%err, "failed to poll generator child status");
            true
        }
    });
}

fn terminate_children(children: &mut [Child]) {
    for child in children.iter() {
        unsafe {
            libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
        }
    }
}
