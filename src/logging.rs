//! Logging setup.
//!
//! Components log through `tracing`; this module installs the subscriber
//! that writes those events to stderr and, optionally, to a log file.

use chrono::Local;
use once_cell::sync::OnceCell;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

/// Log file used by the command line runner when none is given
pub const DEFAULT_LOG_FILE: &str = "app.log";

static INSTALLED: OnceCell<Option<PathBuf>> = OnceCell::new();

/// Local wall-clock timestamps, e.g. `2024-05-01 12:00:00`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTimestamp;

impl FormatTime for LocalTimestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "[{}]", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Installs the global subscriber at INFO level.
///
/// Only the first call in a process installs anything; it returns
/// `Ok(true)`. Later calls return `Ok(false)` and leave the existing setup in
/// place, even if they name a different log file.
///
/// # Errors
///
/// Returns an I/O error if the log file cannot be opened for appending.
pub fn init_logging(log_file: Option<&Path>) -> io::Result<bool> {
    if INSTALLED.get().is_some() {
        return Ok(false);
    }

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_timer(LocalTimestamp)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::INFO),
            )
        }
        None => None,
    };

    let console_layer = fmt::layer()
        .with_timer(LocalTimestamp)
        .with_writer(io::stderr)
        .with_filter(LevelFilter::INFO);

    let mut installed = false;
    INSTALLED.get_or_init(|| {
        installed = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .is_ok();
        // A subscriber installed elsewhere means nothing writes to our file
        log_file.filter(|_| installed).map(Path::to_path_buf)
    });
    Ok(installed)
}

/// The log file chosen by the first `init_logging` call, if any.
pub fn installed_log_file() -> Option<&'static Path> {
    INSTALLED.get().and_then(|path| path.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("app.log");

        let first = init_logging(Some(&log_path)).unwrap();
        assert!(!init_logging(None).unwrap());
        assert!(!init_logging(Some(&dir.path().join("other.log"))).unwrap());

        let expected = if first { Some(log_path.as_path()) } else { None };
        assert_eq!(installed_log_file(), expected);
        assert!(!dir.path().join("other.log").exists());
    }
}
