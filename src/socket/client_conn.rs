//! Per-connection request/response loop (server side).
//!
//! Each accepted connection gets a `SocketClientConn` running on its own
//! task. It reads, frames, decodes, calls the handler, and writes the
//! response before reading the next message, so exchanges on one
//! connection are strictly ordered.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::OwnedSemaphorePermit;

use super::framing::{self, FrameDecoder, Framing};
use crate::config::{MalformedPolicy, ServerConfig};
use crate::handler::Handler;
use crate::message::{Request, Response};

/// Settings shared by every connection of one server.
#[derive(Clone)]
pub(crate) struct ConnSettings {
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) framing: Framing,
    pub(crate) max_message_size: usize,
    pub(crate) malformed: MalformedPolicy,
    pub(crate) idle_timeout: Option<Duration>,
}

impl ConnSettings {
    pub(crate) fn new(handler: Arc<dyn Handler>, config: &ServerConfig) -> Self {
        Self {
            handler,
            framing: config.framing,
            max_message_size: config.max_message_size,
            malformed: config.malformed,
            idle_timeout: config.idle_timeout,
        }
    }
}

impl std::fmt::Debug for ConnSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnSettings")
            .field("framing", &self.framing)
            .field("max_message_size", &self.max_message_size)
            .field("malformed", &self.malformed)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

/// Server-side state for a single client connection.
pub(crate) struct SocketClientConn<S> {
    /// Identifier used in log lines.
    conn_id: String,
    stream: S,
    settings: Arc<ConnSettings>,
    /// Connection-cap slot, released when the connection ends.
    _permit: Option<OwnedSemaphorePermit>,
}

impl<S> std::fmt::Debug for SocketClientConn<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketClientConn")
            .field("conn_id", &self.conn_id)
            .finish_non_exhaustive()
    }
}

impl<S> SocketClientConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(
        conn_id: String,
        stream: S,
        settings: Arc<ConnSettings>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            conn_id,
            stream,
            settings,
            _permit: permit,
        }
    }

    /// Serve this connection until EOF or the first I/O error.
    ///
    /// The stream is dropped (closed) on return.
    pub(crate) async fn run(mut self) {
        let mut decoder = FrameDecoder::new(self.settings.framing, self.settings.max_message_size);
        let mut buf = vec![0u8; self.settings.max_message_size];

        loop {
            let n = match self.read_some(&mut buf).await {
                Ok(0) => {
                    if decoder.has_partial() {
                        log::warn!(
                            "[Socket] {} disconnected mid-message, discarding partial data",
                            self.conn_id
                        );
                    }
                    log::info!("[Socket] Client disconnected: {}", self.conn_id);
                    return;
                }
                Ok(n) => n,
                Err(e) => {
                    log::error!("[Socket] Error reading from {}: {e}", self.conn_id);
                    return;
                }
            };

            let messages = match decoder.feed(&buf[..n]) {
                Ok(messages) => messages,
                Err(e) => {
                    log::warn!("[Socket] Closing {}: {e}", self.conn_id);
                    let response = Response::with_status(413, e.to_string());
                    if let Err(e) = self.write_response(&response).await {
                        log::error!("[Socket] Error writing to {}: {e:#}", self.conn_id);
                    }
                    return;
                }
            };

            for message in messages {
                let response = self.dispatch(&message).await;
                if let Err(e) = self.write_response(&response).await {
                    log::error!("[Socket] Error writing to {}: {e:#}", self.conn_id);
                    return;
                }
            }
        }
    }

    async fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.settings.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, self.stream.read(buf))
                .await
                .unwrap_or_else(|elapsed| Err(io::Error::new(io::ErrorKind::TimedOut, elapsed))),
            None => self.stream.read(buf).await,
        }
    }

    /// Decode one message and run the handler on it.
    async fn dispatch(&self, message: &[u8]) -> Response {
        log::debug!(
            "[Socket] {} received message: {}",
            self.conn_id,
            String::from_utf8_lossy(message)
        );

        let request = match Request::decode(message) {
            Ok(request) => request,
            Err(e) => match self.settings.malformed {
                MalformedPolicy::ZeroValue => {
                    log::warn!(
                        "[Socket] {} sent a malformed request ({e}), using empty request",
                        self.conn_id
                    );
                    Request::default()
                }
                MalformedPolicy::Reject => {
                    log::warn!("[Socket] {} sent a malformed request: {e}", self.conn_id);
                    return Response::with_status(400, format!("Malformed request: {e}"));
                }
            },
        };

        let handler = Arc::clone(&self.settings.handler);
        match tokio::task::spawn_blocking(move || handler.handle(request)).await {
            Ok(response) => response,
            Err(e) => {
                log::error!("[Socket] Handler failed for {}: {e}", self.conn_id);
                Response::with_status(500, "Handler failed")
            }
        }
    }

    async fn write_response(&mut self, response: &Response) -> Result<()> {
        let payload = response.encode().context("Failed to encode response")?;
        let frame = framing::encode(self.settings.framing, &payload)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
