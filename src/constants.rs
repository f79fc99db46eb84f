//! Named defaults for the socket transport.
//!
//! Centralizes the magic numbers used by the server, the framing codec and
//! the configuration layer.
//!
//! # Categories
//!
//! - **Buffers**: Message size limits
//! - **Socket**: Filesystem layout and permissions
//! - **Accept loop**: Backoff and admission limits
//! - **Environment**: Override variable names

use std::time::Duration;

// ============================================================================
// Buffers
// ============================================================================

/// Default per-message size ceiling in bytes.
///
/// In unframed mode this is also the size of the single read that makes up
/// one message; in framed modes larger messages are rejected with a 413.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024;

// ============================================================================
// Socket
// ============================================================================

/// File extension appended to the server name to form the socket path.
pub const SOCKET_EXTENSION: &str = "sock";

/// Default permission bits for the socket file (world read/write).
pub const DEFAULT_SOCKET_MODE: u32 = 0o666;

/// Conservative `sun_path` limit (104 on macOS, 108 on Linux).
pub const MAX_SOCKET_PATH: usize = 104;

/// Default log file name, created in the system temp directory.
pub const DEFAULT_LOG_FILE_NAME: &str = "plugin.log";

// ============================================================================
// Accept loop
// ============================================================================

/// Default cap on concurrently served connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

/// Initial sleep after a failed `accept()`.
pub const ACCEPT_BACKOFF_INITIAL: Duration = Duration::from_millis(100);

/// Upper bound on the accept backoff.
pub const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Consecutive accept failures tolerated before the server stops.
pub const DEFAULT_MAX_ACCEPT_FAILURES: u32 = 10;

// ============================================================================
// Environment
// ============================================================================

/// Overrides [`DEFAULT_MAX_MESSAGE_SIZE`].
pub const ENV_MAX_MESSAGE_SIZE: &str = "MAX_MESSAGE_SIZE";

/// Overrides the directory the socket file is created in.
pub const ENV_SOCKET_DIR: &str = "PLUGIN_SOCKET_DIR";

/// Selects the framing mode (`unframed`, `json`, `length-prefixed`).
pub const ENV_FRAMING: &str = "PLUGIN_SOCKET_FRAMING";

/// Overrides [`DEFAULT_MAX_CONNECTIONS`]; `0` means unbounded.
pub const ENV_MAX_CONNECTIONS: &str = "PLUGIN_SOCKET_MAX_CONNECTIONS";

/// Selects the malformed-payload policy (`zero-value`, `reject`).
pub const ENV_MALFORMED: &str = "PLUGIN_SOCKET_MALFORMED";

/// Idle read timeout in whole seconds.
pub const ENV_IDLE_TIMEOUT_SECS: &str = "PLUGIN_SOCKET_IDLE_TIMEOUT_SECS";

/// Overrides the log file path.
pub const ENV_LOG_FILE: &str = "PLUGIN_SOCKET_LOG_FILE";
