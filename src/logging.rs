//! # Logging
//!
//! `tracing` output goes to stdout and to a per-session log file
//! `payload_<YYYY-mm-dd_HH-MM-SS>.log` in the configured log directory.
//! The filter comes from `RUST_LOG`, with `info` always enabled.

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{PayloadError, Result};

/// Session log file name prefix
pub const SESSION_LOG_PREFIX: &str = "payload";

fn session_log_stem(session_start: DateTime<Utc>) -> String {
    format!(
        "{}_{}",
        SESSION_LOG_PREFIX,
        session_start.format("%Y-%m-%d_%H-%M-%S")
    )
}

/// Path of the session log file
pub fn session_log_path(log_dir: &Path, session_start: DateTime<Utc>) -> PathBuf {
    log_dir.join(format!("{}.log", session_log_stem(session_start)))
}

fn logging_error(err: impl std::fmt::Display) -> PayloadError {
    PayloadError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("Failed to initialize logging: {}", err),
    ))
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer when dropped and must be held
/// for the life of the process.
pub fn init(log_dir: &Path, session_start: DateTime<Utc>) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(session_log_stem(session_start))
        .filename_suffix("log")
        .build(log_dir)
        .map_err(logging_error)?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .map_err(logging_error)?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_log_path() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 5, 3).unwrap();
        assert_eq!(
            session_log_path(Path::new("/var/log/payload"), start),
            PathBuf::from("/var/log/payload/payload_2024-06-01_09-05-03.log")
        );
    }

    #[test]
    fn test_logging_error_is_io() {
        assert!(matches!(logging_error("boom"), PayloadError::Io(_)));
    }
}
