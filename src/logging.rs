//! Log destination setup for binaries embedding the server.
//!
//! The library itself only emits records through the `log` facade and never
//! installs a logger. Applications pick a [`LogDestination`] and call
//! [`init`] once at startup.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::constants::{DEFAULT_LOG_FILE_NAME, ENV_LOG_FILE};

/// Where diagnostic output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    /// Append to a file, creating it if needed.
    File(PathBuf),
    /// Standard error.
    Stderr,
}

impl LogDestination {
    /// `PLUGIN_SOCKET_LOG_FILE` if set, otherwise `<tmp>/plugin.log`.
    pub fn from_env() -> Self {
        match std::env::var(ENV_LOG_FILE) {
            Ok(path) if !path.is_empty() => Self::File(PathBuf::from(path)),
            _ => Self::File(std::env::temp_dir().join(DEFAULT_LOG_FILE_NAME)),
        }
    }
}

/// Install `env_logger` writing to `destination`.
///
/// The filter defaults to `info` and honours `RUST_LOG`.
///
/// # Errors
///
/// Fails if the log file cannot be opened or a logger is already installed.
pub fn init(destination: &LogDestination) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();

    match destination {
        LogDestination::File(path) => {
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file at {}", path.display()))?;
            builder.target(env_logger::Target::Pipe(Box::new(log_file)));
        }
        LogDestination::Stderr => {
            builder.target(env_logger::Target::Stderr);
        }
    }

    builder.try_init().context("Logger already initialized")?;
    Ok(())
}
