//! Generator worker, spawned by the coordinator with two integer
//! arguments: the shared-memory identifier and the semaphore-array
//! identifier (spec.md §6). In this implementation both channels are
//! addressed by the same identifier, so the two arguments are always
//! equal; both are still accepted to match the documented external
//! interface.

use anyhow::{bail, Context};

use ledger_gen::coordinator::{request_shm_path, ring_shm_path};
use ledger_gen::worker::GeneratorConfig;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    ledger_gen::shutdown::install();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 2 {
        bail!("usage: generator <shm_identifier> <semaphore_array_identifier>");
    }
    let channel_id: u32 = args[0]
        .parse()
        .with_context(|| format!("invalid shm identifier {:?}", args[0]))?;

    let config = GeneratorConfig {
        channel_id,
        request_shm_path: request_shm_path(channel_id).to_string_lossy().into_owned(),
        ring_shm_path: ring_shm_path(channel_id).to_string_lossy().into_owned(),
    };

    let produced = ledger_gen::worker::run(config)?;
    tracing::info!(pid = std::process::id(), produced, "generator exiting");
    Ok(())
}
