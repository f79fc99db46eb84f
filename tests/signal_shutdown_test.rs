// Signal-driven shutdown of the socket server.
//
// Delivers a real SIGTERM to the test process, so this file holds a single
// test and runs as its own binary. The server's handler is installed by
// `start()`, so the signal is consumed instead of killing the process.

use std::time::Duration;

use plugin_socket::{Framing, Request, Response, ServerConfig, SocketClient, SocketServer};

#[tokio::test]
async fn test_sigterm_stops_accepting_and_removes_socket() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = ServerConfig {
        socket_dir: tmp.path().to_path_buf(),
        ..ServerConfig::default()
    };
    assert!(config.handle_signals);

    let server = SocketServer::with_config("signal", |req: Request| Response::ok(req.path), config)
        .unwrap()
        .start()
        .unwrap();
    let path = server.socket_path().to_path_buf();

    let mut client = SocketClient::connect(&path, Framing::Json).await.unwrap();
    let response = client.send(&Request::new("GET", "/alive", "")).await.unwrap();
    assert_eq!(response.body, "/alive");

    // SAFETY: sending a signal to our own pid has no memory-safety implications
    let rc = unsafe { libc::kill(libc::getpid(), libc::SIGTERM) };
    assert_eq!(rc, 0, "kill() failed");

    tokio::time::timeout(Duration::from_secs(2), server.wait())
        .await
        .expect("Server did not stop after SIGTERM")
        .unwrap();

    assert!(!path.exists(), "Socket file should be removed after SIGTERM");
    assert!(tokio::net::UnixStream::connect(&path).await.is_err());

    // The connection accepted before the signal is still served
    let response = client.send(&Request::new("GET", "/still-here", "")).await.unwrap();
    assert_eq!(response.body, "/still-here");
}
