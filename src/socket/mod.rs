//! Unix domain socket transport for host↔plugin request/response IPC.
//!
//! A plugin process embeds a [`SocketServer`] with a handler; host
//! processes connect with a [`SocketClient`] (or any client that writes the
//! JSON wire format) instead of opening a TCP port.
//!
//! # Architecture
//!
//! ```text
//! Host Process                         Plugin Process
//! ┌──────────────────┐                ┌──────────────────────┐
//! │ SocketClient     │                │ SocketServer         │
//! │  UnixStream      │◄──────────────►│  UnixListener        │
//! │                  │ Request/       │  accept loop         │
//! │                  │ Response JSON  │  SocketClientConn    │
//! └──────────────────┘                │   per connection     │
//!                                     └──────────┬───────────┘
//!                                                │ Request
//!                                                ▼
//!                                          Handler (Fn)
//! ```
//!
//! # Wire Protocol
//!
//! One JSON object per message, delimited according to [`Framing`]. See
//! [`framing`] for the modes and [`crate::message`] for the schema.

pub mod client;
pub(crate) mod client_conn;
pub mod framing;
pub mod server;
pub mod shutdown;

pub use client::SocketClient;
pub use framing::{FrameDecoder, Framing};
pub use server::{RunningServer, SocketServer};
pub use shutdown::ShutdownHandle;
