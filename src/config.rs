//! Server configuration with environment variable overrides.
//!
//! [`ServerConfig::default`] gives the built-in defaults;
//! [`ServerConfig::from_env`] applies the `MAX_MESSAGE_SIZE` and
//! `PLUGIN_SOCKET_*` overrides on top. Unparseable values are logged and
//! ignored so a typo never prevents the server from starting.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_MAX_ACCEPT_FAILURES, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_SOCKET_MODE, ENV_FRAMING, ENV_IDLE_TIMEOUT_SECS, ENV_MALFORMED, ENV_MAX_CONNECTIONS,
    ENV_MAX_MESSAGE_SIZE, ENV_SOCKET_DIR, SOCKET_EXTENSION,
};
use crate::socket::framing::Framing;

/// What the connection loop does with a payload that is not a valid request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Invoke the handler with `Request::default()` and keep going.
    #[default]
    ZeroValue,
    /// Skip the handler and answer `400`.
    Reject,
}

impl FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zero-value" | "zero" | "default" => Ok(Self::ZeroValue),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown malformed policy '{other}' (expected zero-value or reject)")),
        }
    }
}

/// Configuration for a [`SocketServer`](crate::SocketServer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Directory holding `<name>.sock`.
    pub socket_dir: PathBuf,
    /// Per-message size ceiling in bytes (also the read buffer size).
    pub max_message_size: usize,
    /// Wire framing.
    pub framing: Framing,
    /// Cap on concurrently served connections; `None` is unbounded.
    pub max_connections: Option<usize>,
    /// Handling of undecodable payloads.
    pub malformed: MalformedPolicy,
    /// Mode applied to the socket file after bind.
    pub socket_mode: u32,
    /// Close a connection whose next message does not arrive in time.
    ///
    /// With `None`, a `Json` or `LengthPrefixed` message cut short by the
    /// client gets no response at all: the connection waits for more data
    /// or EOF. Set this to bound how long such a client holds a slot.
    pub idle_timeout: Option<Duration>,
    /// Consecutive `accept()` failures tolerated before stopping.
    pub max_accept_failures: u32,
    /// Install SIGINT/SIGTERM handlers on start.
    ///
    /// tokio keeps a signal's handler installed for the rest of the process
    /// once registered, even after this server stops. An embedding process
    /// that relies on the default Ctrl-C behavior afterwards should set this
    /// to `false` and call [`ShutdownHandle::shutdown`] itself.
    ///
    /// [`ShutdownHandle::shutdown`]: crate::socket::ShutdownHandle::shutdown
    pub handle_signals: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_dir: std::env::temp_dir(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            framing: Framing::default(),
            max_connections: Some(DEFAULT_MAX_CONNECTIONS),
            malformed: MalformedPolicy::default(),
            socket_mode: DEFAULT_SOCKET_MODE,
            idle_timeout: None,
            max_accept_failures: DEFAULT_MAX_ACCEPT_FAILURES,
            handle_signals: true,
        }
    }
}

impl ServerConfig {
    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Path of the socket file for a server called `name`.
    pub fn socket_path(&self, name: &str) -> PathBuf {
        socket_path_in(&self.socket_dir, name)
    }

    /// Apply overrides from `lookup` (an environment-like key/value source).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_SOCKET_DIR) {
            if !dir.is_empty() {
                self.socket_dir = PathBuf::from(dir);
            }
        }

        if let Some(size) = lookup(ENV_MAX_MESSAGE_SIZE) {
            match size.trim().parse::<usize>() {
                Ok(size) if size > 0 => self.max_message_size = size,
                _ => log::warn!(
                    "Invalid {ENV_MAX_MESSAGE_SIZE} value {size:?}, using default: {}",
                    self.max_message_size
                ),
            }
        }

        if let Some(framing) = lookup(ENV_FRAMING) {
            match framing.parse::<Framing>() {
                Ok(framing) => self.framing = framing,
                Err(e) => log::warn!("Invalid {ENV_FRAMING}: {e}"),
            }
        }

        if let Some(max) = lookup(ENV_MAX_CONNECTIONS) {
            match max.trim().parse::<usize>() {
                Ok(0) => self.max_connections = None,
                Ok(max) => self.max_connections = Some(max),
                Err(e) => log::warn!("Invalid {ENV_MAX_CONNECTIONS} value {max:?}: {e}"),
            }
        }

        if let Some(policy) = lookup(ENV_MALFORMED) {
            match policy.parse::<MalformedPolicy>() {
                Ok(policy) => self.malformed = policy,
                Err(e) => log::warn!("Invalid {ENV_MALFORMED}: {e}"),
            }
        }

        if let Some(secs) = lookup(ENV_IDLE_TIMEOUT_SECS) {
            match secs.trim().parse::<u64>() {
                Ok(0) => self.idle_timeout = None,
                Ok(secs) => self.idle_timeout = Some(Duration::from_secs(secs)),
                Err(e) => log::warn!("Invalid {ENV_IDLE_TIMEOUT_SECS} value {secs:?}: {e}"),
            }
        }
    }
}

/// `<dir>/<name>.sock`
pub(crate) fn socket_path_in(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{SOCKET_EXTENSION}"))
}
