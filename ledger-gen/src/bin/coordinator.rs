//! `coordinator <total_records> <num_generators>` (spec.md §6).

use anyhow::{bail, Context};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    ledger_gen::shutdown::install();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (total_records, num_generators) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(1);
        }
    };

    let generator_bin = match sibling_binary("generator") {
        Ok(path) => path,
        Err(err) => {
            tracing::error!(%err, "could not locate the generator binary");
            std::process::exit(2);
        }
    };

    let report = match ledger_gen::coordinator::run(total_records, num_generators, "output.csv", &generator_bin) {
        Ok(report) => report,
        Err(err) => {
            tracing::error!(%err, "coordinator failed");
            std::process::exit(2);
        }
    };

    println!("Registros escritos: {}/{}", report.records_written, report.total_records);
    if report.records_written < report.total_records {
        tracing::warn!(
            written = report.records_written,
            total = report.total_records,
            "coordinator finished short of total_records"
        );
    }
    Ok(())
}

fn parse_args(args: &[String]) -> anyhow::Result<(u64, u64)> {
    if args.len() != 2 {
        bail!("usage: coordinator <total_records> <num_generators>");
    }
    let total_records: u64 = args[0]
        .parse()
        .with_context(|| format!("total_records must be a positive integer, got {:?}", args[0]))?;
    let num_generators: u64 = args[1]
        .parse()
        .with_context(|| format!("num_generators must be a positive integer, got {:?}", args[1]))?;

    if total_records == 0 {
        bail!("total_records must be positive");
    }
    if num_generators == 0 {
        bail!("num_generators must be positive");
    }
    if num_generators > total_records {
        bail!("num_generators ({num_generators}) must be <= total_records ({total_records})");
    }
    Ok((total_records, num_generators))
}

fn sibling_binary(name: &str) -> anyhow::Result<std::path::PathBuf> {
    let mut exe = std::env::current_exe().context("could not determine current executable path")?;
    exe.set_file_name(if cfg!(windows) { format!("{name}.exe") } else { name.to_string() });
    if !exe.exists() {
        bail!("expected sibling binary at {}", exe.display());
    }
    Ok(exe)
}
