use std::path::Path;

use anyhow::{anyhow, Context, Result};
use proclog_common::event_log::EventLog;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, time::SystemTime},
    prelude::*,
    EnvFilter,
};

/// Opens `path` for appending diagnostics, creating its directory if needed.
pub fn open_log_file(path: &Path) -> Result<RollingFileAppender> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("{} does not name a file", path.display()))?;
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(directory)
        .map_err(|e| anyhow!("{}", e))
}

/// Installs the global diagnostic subscriber. Diagnostics go to `log_file`,
/// or to standard output when none is given or it cannot be opened; the
/// latter is reported to the system event log and is not fatal.
///
/// Dropping the returned guard flushes and closes the stream.
pub fn setup_logging(
    log_file: Option<&Path>,
    level: &str,
    event_log: &EventLog,
) -> Result<WorkerGuard> {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file = log_file.and_then(|path| match open_log_file(path) {
        Ok(appender) => Some(appender),
        Err(e) => {
            event_log.error(&format!(
                "Cannot open log file: {}, error: {:#}",
                path.display(),
                e
            ));
            None
        }
    });
    let to_file = file.is_some();
    let (writer, guard) = match file {
        Some(appender) => tracing_appender::non_blocking(appender),
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let layer = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .with_level(true)
        .with_ansi(!to_file)
        .with_timer(SystemTime)
        .with_writer(writer);

    let subscriber = tracing_subscriber::registry().with(filter).with(layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match log_file {
        Some(path) if to_file => tracing::info!("Logging to {}", path.display()),
        Some(path) => tracing::warn!(
            "Cannot open log file {}, logging to standard output",
            path.display()
        ),
        None => tracing::debug!("Logging to standard output"),
    }
    Ok(guard)
}
