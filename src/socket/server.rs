//! Unix domain socket server.
//!
//! [`SocketServer`] is a configured but unbound server. [`SocketServer::start`]
//! consumes it, binds the socket and spawns the accept loop, returning a
//! [`RunningServer`]. Each accepted connection is served by its own
//! [`SocketClientConn`] task.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::client_conn::{ConnSettings, SocketClientConn};
use super::shutdown::{ShutdownHandle, SignalWatcher};
use crate::config::ServerConfig;
use crate::constants::{ACCEPT_BACKOFF_INITIAL, ACCEPT_BACKOFF_MAX, MAX_SOCKET_PATH};
use crate::error::ServerError;
use crate::handler::Handler;

/// A configured server that has not been started yet.
pub struct SocketServer {
    name: String,
    socket_path: PathBuf,
    handler: Arc<dyn Handler>,
    config: ServerConfig,
}

impl std::fmt::Debug for SocketServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketServer")
            .field("name", &self.name)
            .field("socket_path", &self.socket_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SocketServer {
    /// Create a server named `name` using [`ServerConfig::from_env`].
    ///
    /// The socket lives at `<socket_dir>/<name>.sock`.
    ///
    /// # Errors
    ///
    /// See [`SocketServer::with_config`].
    pub fn new<H: Handler>(name: &str, handler: H) -> Result<Self, ServerError> {
        Self::with_config(name, handler, ServerConfig::from_env())
    }

    /// Create a server with an explicit configuration.
    ///
    /// Does not bind anything. A leftover socket file that nobody answers on
    /// is treated as stale and replaced by [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// - [`ServerError::InvalidName`] for an empty name or one containing `/`
    /// - [`ServerError::PathTooLong`] if the path exceeds the `sun_path` limit
    /// - [`ServerError::AlreadyRunning`] if a live server answers on the path
    pub fn with_config<H: Handler>(
        name: &str,
        handler: H,
        config: ServerConfig,
    ) -> Result<Self, ServerError> {
        if name.is_empty() || name.contains('/') || name.contains('\0') {
            return Err(ServerError::InvalidName(name.to_string()));
        }

        let socket_path = config.socket_path(name);
        let len = socket_path.as_os_str().len();
        if len >= MAX_SOCKET_PATH {
            return Err(ServerError::PathTooLong {
                path: socket_path,
                len,
                max: MAX_SOCKET_PATH - 1,
            });
        }

        if socket_path.exists() {
            if is_live_socket(&socket_path) {
                return Err(ServerError::AlreadyRunning(socket_path));
            }
            log::info!(
                "[Socket] Found stale socket file {}, it will be replaced on start",
                socket_path.display()
            );
        }

        Ok(Self {
            name: name.to_string(),
            socket_path,
            handler: Arc::new(handler),
            config,
        })
    }

    /// Server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the socket will be bound at.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Effective configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the socket and start accepting connections.
    ///
    /// Removes any stale file at the socket path, binds, applies
    /// `config.socket_mode`, installs the SIGINT/SIGTERM watcher (unless
    /// disabled) and spawns the accept loop. Must be called from inside a
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`], [`ServerError::Permissions`] or
    /// [`ServerError::Signal`]; nothing is left listening in that case.
    pub fn start(self) -> Result<RunningServer, ServerError> {
        let Self {
            socket_path,
            handler,
            config,
            ..
        } = self;

        let bind_error = |source: io::Error| ServerError::Bind {
            path: socket_path.clone(),
            source,
        };

        // Remove stale socket file if it exists
        match std::fs::remove_file(&socket_path) {
            Ok(()) => log::debug!("[Socket] Removed stale socket: {}", socket_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(bind_error(e)),
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(bind_error)?;
        }

        let listener = std::os::unix::net::UnixListener::bind(&socket_path).map_err(bind_error)?;
        // Anything failing from here on must not leave the file behind
        let cleanup = scopeguard::guard(socket_path.clone(), |path| remove_socket_file(&path));

        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(config.socket_mode))
            .map_err(|source| ServerError::Permissions {
                path: socket_path.clone(),
                source,
            })?;

        // Convert std listener to tokio async listener
        listener.set_nonblocking(true).map_err(bind_error)?;
        let listener = UnixListener::from_std(listener).map_err(bind_error)?;

        let shutdown = ShutdownHandle::new();
        let signal_handle = if config.handle_signals {
            let watcher = SignalWatcher::register().map_err(ServerError::Signal)?;
            Some(watcher.spawn(shutdown.clone()))
        } else {
            None
        };

        log::info!(
            "[Socket] Unix domain socket server listening on {} ({} framing)",
            socket_path.display(),
            config.framing
        );

        let accept_loop = AcceptLoop {
            listener,
            socket_path: scopeguard::ScopeGuard::into_inner(cleanup),
            settings: Arc::new(ConnSettings::new(handler, &config)),
            permits: config
                .max_connections
                .map(|max| Arc::new(Semaphore::new(max.max(1)))),
            shutdown: shutdown.clone(),
            max_accept_failures: config.max_accept_failures.max(1),
        };
        let accept_handle = tokio::spawn(accept_loop.run());

        Ok(RunningServer {
            socket_path,
            shutdown,
            accept_handle,
            signal_handle,
        })
    }

    /// Start and run until the accept loop exits.
    ///
    /// Returns `Ok(())` after a signal or programmatic shutdown.
    pub async fn serve(self) -> Result<(), ServerError> {
        self.start()?.wait().await
    }
}

/// A bound server whose accept loop is running.
///
/// Dropping it does not stop the server; call [`shutdown`](Self::shutdown)
/// or deliver SIGINT/SIGTERM.
#[derive(Debug)]
pub struct RunningServer {
    socket_path: PathBuf,
    shutdown: ShutdownHandle,
    accept_handle: JoinHandle<Result<(), ServerError>>,
    signal_handle: Option<JoinHandle<()>>,
}

impl RunningServer {
    /// Path of the bound socket.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Handle that can stop this server from anywhere.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Stop accepting connections and remove the socket file.
    ///
    /// Connections already being served are left to finish on their own.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Whether the accept loop has exited.
    pub fn is_finished(&self) -> bool {
        self.accept_handle.is_finished()
    }

    /// Wait for the accept loop to exit.
    ///
    /// # Errors
    ///
    /// [`ServerError::AcceptFailed`] if the loop gave up after repeated
    /// accept errors.
    pub async fn wait(self) -> Result<(), ServerError> {
        let result = self.accept_handle.await?;
        // Release the signal watcher if it is still waiting
        self.shutdown.shutdown();
        if let Some(handle) = self.signal_handle {
            let _ = handle.await;
        }
        result
    }
}

/// Where the accept loop gets its connections from.
pub(crate) trait AcceptSource: Send + 'static {
    fn poll_accept_conn(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<UnixStream>>;
}

impl AcceptSource for UnixListener {
    fn poll_accept_conn(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<UnixStream>> {
        self.poll_accept(cx).map_ok(|(stream, _addr)| stream)
    }
}

/// State owned by the accept loop task.
struct AcceptLoop<L = UnixListener> {
    listener: L,
    socket_path: PathBuf,
    settings: Arc<ConnSettings>,
    permits: Option<Arc<Semaphore>>,
    shutdown: ShutdownHandle,
    max_accept_failures: u32,
}

impl<L: AcceptSource> AcceptLoop<L> {
    async fn run(self) -> Result<(), ServerError> {
        let Self {
            mut listener,
            socket_path,
            settings,
            permits,
            shutdown,
            max_accept_failures,
        } = self;

        // Every exit path, including task cancellation, removes the socket file
        let socket_path = scopeguard::guard(socket_path, |path| remove_socket_file(&path));

        let mut failures = 0u32;
        let mut backoff = ACCEPT_BACKOFF_INITIAL;

        loop {
            // Hold a slot before accepting so a full server stops accepting
            let permit = match &permits {
                Some(permits) => tokio::select! {
                    permit = Arc::clone(permits).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(e) => {
                            log::error!("[Socket] Connection limiter closed: {e}");
                            break;
                        }
                    },
                    () = shutdown.cancelled() => break,
                },
                None => None,
            };

            let accepted = tokio::select! {
                accepted = std::future::poll_fn(|cx| listener.poll_accept_conn(cx)) => accepted,
                () = shutdown.cancelled() => break,
            };

            match accepted {
                Ok(stream) => {
                    failures = 0;
                    backoff = ACCEPT_BACKOFF_INITIAL;

                    let conn_id = generate_conn_id();
                    log::info!("[Socket] Client connected: {}", conn_id);
                    let conn = SocketClientConn::new(conn_id, stream, Arc::clone(&settings), permit);
                    tokio::spawn(conn.run());
                }
                Err(e) => {
                    failures += 1;
                    log::error!(
                        "[Socket] Error accepting connection ({failures}/{max_accept_failures}): {e}"
                    );
                    if failures >= max_accept_failures {
                        return Err(ServerError::AcceptFailed {
                            failures,
                            source: e,
                        });
                    }
                    tokio::select! {
                        () = tokio::time::sleep(backoff) => {}
                        () = shutdown.cancelled() => break,
                    }
                    backoff = next_backoff(backoff);
                }
            }
        }

        log::info!("[Socket] Shutting down socket server on {}", socket_path.display());
        Ok(())
    }
}

fn next_backoff(current: Duration) -> Duration {
    current.saturating_mul(2).min(ACCEPT_BACKOFF_MAX)
}

/// True if something accepts connections on `path`.
fn is_live_socket(path: &Path) -> bool {
    std::os::unix::net::UnixStream::connect(path).is_ok()
}

fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("[Socket] Removed socket file: {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::error!("[Socket] Error removing socket file {}: {e}", path.display()),
    }
}

/// Generate a unique connection ID using a monotonic counter + random suffix.
fn generate_conn_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let rand: u16 = rand::random();
    format!("conn:{seq:x}{rand:04x}")
}
