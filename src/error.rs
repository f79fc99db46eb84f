//! Error types for the socket transport.
//!
//! Construction and startup problems are returned as [`ServerError`] so the
//! embedding application decides whether to abort, retry, or pick another
//! name. Per-connection problems never surface here; they close the
//! connection and are logged.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from constructing, starting, or running a [`SocketServer`](crate::SocketServer).
#[derive(Debug, Error)]
pub enum ServerError {
    /// The server name cannot be turned into a socket file name.
    #[error("Invalid server name {0:?}: must be non-empty and contain no '/'")]
    InvalidName(String),

    /// The derived socket path exceeds the OS `sun_path` limit.
    #[error("Socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        /// Offending path.
        path: PathBuf,
        /// Its length in bytes.
        len: usize,
        /// Largest accepted length.
        max: usize,
    },

    /// A live server already answers on the socket path.
    #[error("Another server is already listening on {0}")]
    AlreadyRunning(PathBuf),

    /// Removing the stale file, creating the directory, or binding failed.
    #[error("Failed to bind socket {path}: {source}")]
    Bind {
        /// Socket path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Setting the socket file mode failed.
    #[error("Failed to set permissions on {path}: {source}")]
    Permissions {
        /// Socket path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Registering the SIGINT/SIGTERM handlers failed.
    #[error("Failed to register signal handler: {0}")]
    Signal(#[source] io::Error),

    /// `accept()` kept failing and the backoff budget ran out.
    #[error("Accept failed {failures} times in a row, last error: {source}")]
    AcceptFailed {
        /// Consecutive failures observed.
        failures: u32,
        /// The last error returned by `accept()`.
        #[source]
        source: io::Error,
    },

    /// The accept loop task ended abnormally.
    #[error("Accept loop terminated: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors from the framing decoder.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// A message exceeds the configured size limit.
    #[error("Message too large: {size} bytes (max {max})")]
    TooLarge {
        /// Size seen (or declared by a length prefix).
        size: usize,
        /// Configured limit.
        max: usize,
    },
}
