//! Shutdown signalling for the accept loop.
//!
//! A [`ShutdownHandle`] is a cloneable cancellation token. The accept loop
//! watches it; the signal watcher and [`RunningServer::shutdown`] trip it.
//! Tripping it stops new connections and removes the socket file. It does
//! not touch connections that were already accepted.
//!
//! [`RunningServer::shutdown`]: super::server::RunningServer::shutdown

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cloneable handle that stops a running server.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    /// Create an untripped handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// SIGINT/SIGTERM listener.
///
/// Handlers are installed by [`SignalWatcher::register`], so a signal that
/// arrives after it returns is never lost, even before the watcher task is
/// first polled.
#[derive(Debug)]
pub(crate) struct SignalWatcher {
    interrupt: Signal,
    terminate: Signal,
}

impl SignalWatcher {
    /// Install the handlers. Must be called inside a tokio runtime.
    ///
    /// The process keeps them after the watcher exits: a later SIGINT is
    /// swallowed instead of terminating the process.
    pub(crate) fn register() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Spawn the watcher task. It trips `handle` on the first signal and
    /// exits quietly if `handle` is tripped by someone else first.
    pub(crate) fn spawn(mut self, handle: ShutdownHandle) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = self.interrupt.recv() => {
                    log::info!("[Socket] SIGINT received, shutting down socket server");
                }
                _ = self.terminate.recv() => {
                    log::info!("[Socket] SIGTERM received, shutting down socket server");
                }
                () = handle.cancelled() => return,
            }
            handle.shutdown();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_handle_clones_share_state() {
        let handle = ShutdownHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_shutdown());
        handle.shutdown();
        assert!(clone.is_shutdown());
        handle.shutdown();
        assert!(clone.is_shutdown());
    }

    #[tokio::test]
    async fn test_watcher_exits_when_handle_tripped() {
        let handle = ShutdownHandle::new();
        let watcher = SignalWatcher::register().unwrap();
        let task = watcher.spawn(handle.clone());

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("Watcher did not exit")
            .expect("Watcher panicked");
    }
}
