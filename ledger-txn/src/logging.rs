//! Append-only event log (spec.md §6: "each line prefixed `[LOG]`").
//!
//! Realized as a second `tracing_subscriber` fmt layer writing to the
//! configured log file alongside the usual stderr layer, rather than a
//! hand-rolled `fprintf`-to-file helper - the same "log sink" the rest of
//! the workspace treats as an ambient concern, not a bespoke one for this
//! crate.

use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Formats one event as `[LOG] <level> <target>: <fields>`, matching the
/// line prefix spec.md §6 requires of the log file.
struct PrefixedLogLine;

impl<S, N> FormatEvent<S, N> for PrefixedLogLine
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(writer, "[LOG] {} {}: ", metadata.level(), metadata.target())?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install a global subscriber that writes human-readable events to stderr
/// and `[LOG]`-prefixed lines to `log_file` (created if absent, appended to
/// otherwise). Filterable via `RUST_LOG`.
pub fn init(log_file: &str) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .event_format(PrefixedLogLine);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}
