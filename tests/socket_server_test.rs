// Integration tests for the plugin socket server.
//
// These tests verify that:
// 1. Raw JSON clients get byte-exact responses
// 2. Exchanges on one connection are strictly ordered, one handler call each
// 3. Concurrent connections do not interfere with each other
// 4. Malformed payloads reach the handler as a zero-valued request
// 5. The oversized-message limitation behaves as documented per framing mode

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use plugin_socket::{
    Framing, Request, Response, RunningServer, ServerConfig, SocketClient, SocketServer,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

const TIMEOUT: Duration = Duration::from_secs(2);

fn config(dir: &Path, framing: Framing) -> ServerConfig {
    ServerConfig {
        socket_dir: dir.to_path_buf(),
        framing,
        handle_signals: false,
        ..ServerConfig::default()
    }
}

fn start<H: plugin_socket::Handler>(name: &str, handler: H, config: ServerConfig) -> RunningServer {
    SocketServer::with_config(name, handler, config)
        .unwrap()
        .start()
        .unwrap()
}

/// Handler that records every request it sees.
fn recording_handler() -> (Arc<Mutex<Vec<Request>>>, impl plugin_socket::Handler) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let handler = move |req: Request| {
        recorder.lock().unwrap().push(req);
        Response::ok("recorded")
    };
    (seen, handler)
}

async fn wait_for_requests(seen: &Arc<Mutex<Vec<Request>>>, count: usize) -> Vec<Request> {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            let snapshot = seen.lock().unwrap().clone();
            if snapshot.len() >= count {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Timed out waiting for handler calls")
}

#[tokio::test]
async fn test_raw_json_client_gets_exact_response() {
    let tmp = tempfile::TempDir::new().unwrap();
    let handler = |req: Request| match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/x") => Response::ok("ok"),
        _ => Response::with_status(404, ""),
    };
    let server = start("exact", handler, config(tmp.path(), Framing::Json));

    let mut stream = UnixStream::connect(server.socket_path()).await.unwrap();
    stream
        .write_all(br#"{"Method":"GET","Path":"/x","Headers":{},"Body":""}"#)
        .await
        .unwrap();

    let mut buf = [0u8; 1024];
    let n = tokio::time::timeout(TIMEOUT, stream.read(&mut buf))
        .await
        .expect("Timed out")
        .expect("Read failed");
    assert_eq!(
        std::str::from_utf8(&buf[..n]).unwrap(),
        r#"{"StatusCode":200,"Headers":{},"Body":"ok"}"#
    );

    server.shutdown();
}

#[tokio::test]
async fn test_serial_exchanges_are_ordered_one_call_each() {
    for framing in [Framing::Unframed, Framing::Json, Framing::LengthPrefixed] {
        let tmp = tempfile::TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = move |req: Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            Response::ok(req.path)
        };
        let server = start("serial", handler, config(tmp.path(), framing));

        let mut client = SocketClient::connect(server.socket_path(), framing).await.unwrap();
        for i in 0..20 {
            let response = client
                .send(&Request::new("GET", format!("/item/{i}"), ""))
                .await
                .unwrap();
            assert_eq!(response.body, format!("/item/{i}"), "framing {framing}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 20, "framing {framing}");

        server.shutdown();
        server.wait().await.unwrap();
    }
}

#[tokio::test]
async fn test_concurrent_clients_keep_their_own_pairing() {
    let tmp = tempfile::TempDir::new().unwrap();
    let handler = |req: Request| Response::ok(format!("{}:{}", req.headers["client"], req.path));
    let server = start("concurrent", handler, config(tmp.path(), Framing::Json));
    let path = server.socket_path().to_path_buf();

    let run_client = |name: &'static str| {
        let path = path.clone();
        async move {
            let mut client = SocketClient::connect(&path, Framing::Json).await.unwrap();
            for i in 0..25 {
                let request = Request::new("GET", format!("/{i}"), "").with_header("client", name);
                let response = client.send(&request).await.unwrap();
                assert_eq!(response.body, format!("{name}:/{i}"));
                tokio::task::yield_now().await;
            }
        }
    };

    let a = tokio::spawn(run_client("a"));
    let b = tokio::spawn(run_client("b"));
    tokio::time::timeout(TIMEOUT, async {
        a.await.unwrap();
        b.await.unwrap();
    })
    .await
    .expect("Clients did not finish");

    server.shutdown();
}

#[tokio::test]
async fn test_malformed_payload_reaches_handler_as_zero_request() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (seen, handler) = recording_handler();
    let server = start("malformed", handler, config(tmp.path(), Framing::Unframed));

    let mut client = SocketClient::connect(server.socket_path(), Framing::Unframed)
        .await
        .unwrap();
    client.send_raw(br#"{"Method":"GET","Path":17}"#).await.unwrap();
    let response = client.receive().await.unwrap();
    assert_eq!(response.body, "recorded");

    let requests = wait_for_requests(&seen, 1).await;
    assert_eq!(requests, vec![Request::default()]);

    server.shutdown();
}

#[tokio::test]
async fn test_json_value_with_trailing_garbage_is_one_zero_request() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (seen, handler) = recording_handler();
    let server = start("glued", handler, config(tmp.path(), Framing::Json));

    let mut client = SocketClient::connect(server.socket_path(), Framing::Json).await.unwrap();
    client.send_raw(br#"{"Method":"GET","Path":"/x"}junk"#).await.unwrap();
    let response = tokio::time::timeout(TIMEOUT, client.receive())
        .await
        .expect("Timed out")
        .unwrap();
    assert_eq!(response.body, "recorded");

    // No second response follows the first
    let extra = tokio::time::timeout(Duration::from_millis(200), client.receive()).await;
    assert!(extra.is_err(), "Unexpected second response: {extra:?}");

    let requests = wait_for_requests(&seen, 1).await;
    assert_eq!(requests, vec![Request::default()]);

    server.shutdown();
}

#[tokio::test]
async fn test_json_framing_reassembles_split_writes() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (seen, handler) = recording_handler();
    let server = start("split", handler, config(tmp.path(), Framing::Json));

    let mut stream = UnixStream::connect(server.socket_path()).await.unwrap();
    let message = br#"{"Method":"POST","Path":"/split","Headers":{"k":"v"},"Body":"abc"}"#;
    for chunk in message.chunks(7) {
        stream.write_all(chunk).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let requests = wait_for_requests(&seen, 1).await;
    assert_eq!(
        requests,
        vec![Request::new("POST", "/split", "abc").with_header("k", "v")]
    );

    server.shutdown();
}

/// Known limitation: in unframed mode a message larger than one read is
/// never reassembled. The handler only ever sees undecodable fragments,
/// which arrive as zero-valued requests.
#[tokio::test]
async fn test_unframed_oversized_message_is_not_reassembled() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (seen, handler) = recording_handler();
    let server = start("truncate", handler, config(tmp.path(), Framing::Unframed));

    let prefix = br#"{"Method":"POST","Path":"/big","Headers":{},"Body":""#;
    let suffix = br#""}"#;
    let mut message = prefix.to_vec();
    message.extend(vec![b'x'; 20_000 - prefix.len() - suffix.len()]);
    message.extend_from_slice(suffix);
    assert_eq!(message.len(), 20_000);

    let mut stream = UnixStream::connect(server.socket_path()).await.unwrap();
    stream.write_all(&message).await.unwrap();

    let requests = wait_for_requests(&seen, 2).await;
    assert!(
        requests.iter().all(Request::is_zero),
        "A fragment decoded as a real request: {requests:?}"
    );

    server.shutdown();
}

#[tokio::test]
async fn test_json_oversized_message_gets_413_and_close() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (seen, handler) = recording_handler();
    let server = start("toolarge", handler, config(tmp.path(), Framing::Json));

    let request = Request::new("POST", "/big", "x".repeat(20_000));
    let mut client = SocketClient::connect(server.socket_path(), Framing::Json).await.unwrap();
    client.send_request(&request).await.unwrap();

    let response = tokio::time::timeout(TIMEOUT, client.receive())
        .await
        .expect("Timed out")
        .unwrap();
    assert_eq!(response.status_code, 413);
    assert!(response.body.contains("16384"), "{}", response.body);

    let closed = tokio::time::timeout(TIMEOUT, client.receive()).await.expect("Timed out");
    assert!(closed.is_err(), "Connection should be closed after 413");
    assert!(seen.lock().unwrap().is_empty());

    server.shutdown();
}

#[tokio::test]
async fn test_connect_named_finds_server() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = config(tmp.path(), Framing::LengthPrefixed);
    let server = start("named", |req: Request| Response::ok(req.body), config.clone());

    let mut client = SocketClient::connect_named("named", &config).await.unwrap();
    let response = client.send(&Request::new("POST", "/", "hello")).await.unwrap();
    assert_eq!(response, Response::ok("hello"));

    server.shutdown();
    server.wait().await.unwrap();
}
