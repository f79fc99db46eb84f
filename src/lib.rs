//! Plugin socket - request/response IPC over a Unix domain socket.
//!
//! A plugin process exposes an HTTP-like request/response interface on a
//! filesystem socket instead of a TCP port. The embedding application
//! supplies a [`Handler`]; the server owns the socket, the accept loop,
//! per-connection framing and shutdown.
//!
//! ```rust,no_run
//! use plugin_socket::{Request, Response, SocketServer};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let server = SocketServer::new("weather", |req: Request| match req.path.as_str() {
//!     "/forecast" => Response::ok("sunny"),
//!     _ => Response::with_status(404, "not found"),
//! })?;
//! server.serve().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`socket`] - Server, client, framing and shutdown
//! - [`message`] - Request/response wire types
//! - [`config`] - Configuration and environment overrides
//! - [`logging`] - Log destination setup for binaries

pub mod config;
pub mod constants;
pub mod error;
pub mod handler;
pub mod logging;
pub mod message;
pub mod socket;

// Re-export commonly used types
pub use config::{MalformedPolicy, ServerConfig};
pub use error::{FrameError, ServerError};
pub use handler::Handler;
pub use message::{Headers, Request, Response};
pub use socket::{Framing, RunningServer, ShutdownHandle, SocketClient, SocketServer};
