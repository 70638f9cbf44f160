//! Tracing setup: a size- and count-bounded rotating log file plus an
//! `EnvFilter`-driven subscriber, mirroring the reference deployment's
//! 5 MiB / 3-backup rotating file handler.

use std::path::Path;

use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use tracing_subscriber::EnvFilter;

const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_BACKUPS: usize = 3;

/// Must be kept alive for the lifetime of the process — dropping it stops
/// the non-blocking writer thread and silently truncates in-flight logs.
pub struct LoggingGuard(#[allow(dead_code)] tracing_appender::non_blocking::WorkerGuard);

pub fn init(log_dir: &str, log_level: &str) -> std::io::Result<LoggingGuard> {
    std::fs::create_dir_all(log_dir)?;
    let appender = BasicRollingFileAppender::new(
        Path::new(log_dir).join("widesky.log"),
        RollingConditionBasic::new().max_size(MAX_LOG_BYTES),
        MAX_LOG_BACKUPS,
    )?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(LoggingGuard(guard))
}
