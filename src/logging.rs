//! Tracing setup: console output plus a per-run log file next to the report.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to prepare log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create log file at {path}: {source}")]
    CreateLogFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// `scan_report_<stamp>.log`.
pub fn log_file_name(stamp: &str) -> String {
    format!("scan_report_{stamp}.log")
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a subscriber writing to stdout and to `<dir>/scan_report_<stamp>.log`.
///
/// Keep the returned guard alive for the whole run; dropping it flushes the file.
pub fn init(dir: &Path, stamp: &str) -> Result<(WorkerGuard, PathBuf), LoggingError> {
    fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let name = log_file_name(stamp);
    let path = dir.join(&name);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| LoggingError::CreateLogFile {
            path: path.clone(),
            source,
        })?;

    let appender = tracing_appender::rolling::never(dir, name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    let subscriber = Registry::default()
        .with(env_filter())
        .with(fmt::layer().with_target(false).with_writer(std::io::stdout))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(file_writer),
        );
    tracing::subscriber::set_global_default(subscriber)?;
    Ok((guard, path))
}

/// Console-only fallback used when the log file cannot be prepared.
pub fn init_console() -> Result<(), LoggingError> {
    let subscriber = Registry::default()
        .with(env_filter())
        .with(fmt::layer().with_target(false).with_writer(std::io::stdout));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
