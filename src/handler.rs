//! The injected request handler.
//!
//! A handler is the only business logic the server runs. It is invoked from
//! the blocking thread pool, possibly from many connections at once, so it
//! must be `Send + Sync`; any state it touches is its own to synchronize.

use crate::message::{Request, Response};

/// Maps one decoded [`Request`] to the [`Response`] sent back.
///
/// Handlers report their own failures as responses (typically a non-2xx
/// status code). Plain closures implement this trait:
///
/// ```rust
/// use plugin_socket::{Handler, Request, Response};
///
/// fn assert_handler(_: impl Handler) {}
/// assert_handler(|req: Request| Response::ok(req.path));
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Produce the response for `request`.
    fn handle(&self, request: Request) -> Response;
}

impl<F> Handler for F
where
    F: Fn(Request) -> Response + Send + Sync + 'static,
{
    fn handle(&self, request: Request) -> Response {
        self(request)
    }
}
