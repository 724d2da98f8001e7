//! The generator worker loop (spec.md §4.5).

use ledger_sync::SemaphoreSetId;

use crate::error::Result;
use crate::protocol::{IdRequestMsg, Record};
use crate::record_ring::RecordRing;
use crate::request_channel::RequestChannel;
use crate::shutdown;

/// Everything a generator process needs to attach to the coordinator's
/// channels, as handed to it on the command line (spec.md §6: "Generators
/// are spawned... with two integer arguments: the shared-memory identifier
/// and the semaphore-array identifier").
pub struct GeneratorConfig {
    /// Shared semaphore/shm identifier, common to both channels.
    pub channel_id: SemaphoreSetId,
    /// Path to the request slot's backing shared memory file.
    pub request_shm_path: String,
    /// Path to the record ring's backing shared memory file.
    pub ring_shm_path: String,
}

/// Run one generator to completion: request id blocks until `NoMoreIds`,
/// synthesizing and enqueuing a record for every id in between. Exits the
/// loop promptly once a shutdown signal has been observed (spec.md §4.5:
/// "On SIGTERM/SIGINT, exit immediately").
pub fn run(config: GeneratorConfig) -> Result<u64> {
    let mut requests = RequestChannel::open(config.channel_id, &config.request_shm_path)?;
    let mut ring = RecordRing::open(config.channel_id, &config.ring_shm_path)?;
    let pid = std::process::id();
    let mut produced = 0u64;

    loop {
        if shutdown::requested() {
            tracing::info!(pid, produced, "generator exiting on signal");
            return Ok(produced);
        }

        match requests.request_ids(pid)? {
            IdRequestMsg::NoMoreIds => {
                tracing::info!(pid, produced, "no more ids, generator exiting cleanly");
                return Ok(produced);
            }
            IdRequestMsg::Assign { start, end } => {
                for id in start..=end {
                    if shutdown::requested() {
                        tracing::info!(pid, produced, "generator exiting on signal mid-block");
                        return Ok(produced);
                    }
                    let record = Record::synthesize(id);
                    ring.push(&record)?;
                    produced += 1;
                }
            }
            IdRequestMsg::Request { .. } => {
                // The coordinator never echoes a Request variant back; a
                // well-behaved coordinator always replies Assign or
                // NoMoreIds. Treat it as "nothing assigned" and ask again.
            }
        }
    }
}
