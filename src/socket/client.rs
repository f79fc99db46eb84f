//! Client side of the plugin socket protocol.
//!
//! Used by host processes to talk to a plugin, and by the `request`
//! subcommand. Speaks the same framing as the server it connects to.

use std::collections::VecDeque;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use super::framing::{self, FrameDecoder, Framing};
use crate::config::ServerConfig;
use crate::message::{Request, Response};

/// Largest response the client will buffer (16 MB).
const MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// Read buffer size.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Connection to a plugin socket server.
#[derive(Debug)]
pub struct SocketClient {
    stream: UnixStream,
    framing: Framing,
    decoder: FrameDecoder,
    /// Complete messages read but not yet returned.
    pending: VecDeque<Vec<u8>>,
    buf: Vec<u8>,
}

impl SocketClient {
    /// Connect to the socket at `path`.
    pub async fn connect(path: impl AsRef<Path>, framing: Framing) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .with_context(|| format!("Failed to connect to {}", path.display()))?;

        Ok(Self {
            stream,
            framing,
            decoder: FrameDecoder::new(framing, MAX_RESPONSE_SIZE),
            pending: VecDeque::new(),
            buf: vec![0u8; READ_BUFFER_SIZE],
        })
    }

    /// Connect to the server called `name`, locating it the same way the
    /// server derives its socket path.
    pub async fn connect_named(name: &str, config: &ServerConfig) -> Result<Self> {
        Self::connect(config.socket_path(name), config.framing).await
    }

    /// Send one request and wait for its response.
    pub async fn send(&mut self, request: &Request) -> Result<Response> {
        self.send_request(request).await?;
        self.receive().await
    }

    /// Write one request without waiting for the response.
    pub async fn send_request(&mut self, request: &Request) -> Result<()> {
        let payload = request.encode().context("Failed to encode request")?;
        self.send_raw(&payload).await
    }

    /// Frame and write an arbitrary payload (which need not be valid JSON).
    pub async fn send_raw(&mut self, payload: &[u8]) -> Result<()> {
        let frame = framing::encode(self.framing, payload)?;
        self.stream
            .write_all(&frame)
            .await
            .context("Failed to write request")?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Wait for the next response.
    ///
    /// Cancel safe: data read before cancellation is kept for the next call.
    pub async fn receive(&mut self) -> Result<Response> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Response::decode(&message).context("Invalid response from server");
            }

            let n = self
                .stream
                .read(&mut self.buf)
                .await
                .context("Failed to read response")?;
            if n == 0 {
                bail!("Connection closed before a response arrived");
            }
            self.pending.extend(self.decoder.feed(&self.buf[..n])?);
        }
    }

    /// Framing this client speaks.
    pub fn framing(&self) -> Framing {
        self.framing
    }
}
