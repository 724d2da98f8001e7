//! `server <max_concurrent> <max_waiting>` (spec.md §6), optionally
//! configured by a `server.conf` in the current directory.

use anyhow::{bail, Context};

use ledger_txn::acceptor::Acceptor;
use ledger_txn::config::Config;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (max_concurrent, max_waiting) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(1);
        }
    };

    let config = Config::load("server.conf").context("failed to read server.conf")?;
    ledger_txn::logging::init(&config.log_file).context("failed to open log file")?;
    ledger_txn::shutdown::install();

    tracing::info!(
        host = %config.host,
        port = config.port,
        csv_file = %config.csv_file,
        max_concurrent,
        max_waiting,
        "server starting"
    );

    let mut acceptor = match Acceptor::bind(&config.host, config.port, max_concurrent, max_waiting, config.csv_file.clone().into()) {
        Ok(acceptor) => acceptor,
        Err(err) => {
            tracing::error!(%err, "failed to bind listening socket");
            std::process::exit(2);
        }
    };

    acceptor.run()?;
    tracing::info!("server stopped");
    Ok(())
}

fn parse_args(args: &[String]) -> anyhow::Result<(u32, u32)> {
    if args.len() != 2 {
        bail!("usage: server <max_concurrent> <max_waiting>");
    }
    let max_concurrent: u32 = args[0]
        .parse()
        .with_context(|| format!("max_concurrent must be a positive integer, got {:?}", args[0]))?;
    let max_waiting: u32 = args[1]
        .parse()
        .with_context(|| format!("max_waiting must be a positive integer, got {:?}", args[1]))?;

    if max_concurrent == 0 {
        bail!("max_concurrent must be positive");
    }
    if max_waiting == 0 {
        bail!("max_waiting must be positive");
    }
    Ok((max_concurrent, max_waiting))
}
