//! Plugin socket CLI - run a demo echo plugin or send a single request.
//!
//! This is the binary entry point. See the `plugin_socket` library for the
//! transport itself.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use plugin_socket::logging::{self, LogDestination};
use plugin_socket::{Framing, Request, Response, ServerConfig, SocketClient, SocketServer};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "plugin-socket")]
#[command(version)]
#[command(about = "Request/response IPC over a Unix domain socket")]
struct Cli {
    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    log_stderr: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by both subcommands for locating the socket.
#[derive(clap::Args)]
struct SocketArgs {
    /// Server name; the socket is `<socket-dir>/<name>.sock`
    #[arg(long)]
    name: String,
    /// Directory holding the socket (defaults to PLUGIN_SOCKET_DIR or the temp dir)
    #[arg(long)]
    socket_dir: Option<std::path::PathBuf>,
    /// Wire framing: unframed, json or length-prefixed
    #[arg(long)]
    framing: Option<Framing>,
}

impl SocketArgs {
    fn config(&self) -> ServerConfig {
        let mut config = ServerConfig::from_env();
        if let Some(dir) = &self.socket_dir {
            config.socket_dir.clone_from(dir);
        }
        if let Some(framing) = self.framing {
            config.framing = framing;
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run an echo plugin that answers every request with its own contents
    Serve {
        #[command(flatten)]
        socket: SocketArgs,
        /// Cap on concurrent connections (0 = unbounded)
        #[arg(long)]
        max_connections: Option<usize>,
    },
    /// Send one request and print the response as JSON
    Request {
        #[command(flatten)]
        socket: SocketArgs,
        /// Request method
        #[arg(long, default_value = "GET")]
        method: String,
        /// Request path
        #[arg(long, default_value = "/")]
        path: String,
        /// Header as KEY=VALUE (repeatable)
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
        /// Request body
        #[arg(long, default_value = "")]
        body: String,
    },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("header '{raw}' must be KEY=VALUE"))
}

/// Handler for the demo plugin.
fn echo_handler(request: Request) -> Response {
    let body = serde_json::json!({
        "method": request.method,
        "path": request.path,
        "headers": request.headers,
        "body": request.body,
    });
    Response::ok(body.to_string()).with_header("Content-Type", "application/json")
}

async fn run_serve(socket: &SocketArgs, max_connections: Option<usize>) -> Result<()> {
    let mut config = socket.config();
    if let Some(max) = max_connections {
        config.max_connections = (max > 0).then_some(max);
    }

    let server = SocketServer::with_config(&socket.name, echo_handler, config)?;
    eprintln!("Listening on {}", server.socket_path().display());
    server.serve().await?;
    eprintln!("Socket server stopped");
    Ok(())
}

async fn run_request(socket: &SocketArgs, request: Request) -> Result<()> {
    let config = socket.config();
    let mut client = SocketClient::connect_named(&socket.name, &config).await?;
    let response = client.send(&request).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("Failed to print response")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let destination = if cli.log_stderr {
        LogDestination::Stderr
    } else {
        LogDestination::from_env()
    };
    logging::init(&destination)?;

    match cli.command {
        Commands::Serve {
            socket,
            max_connections,
        } => run_serve(&socket, max_connections).await,
        Commands::Request {
            socket,
            method,
            path,
            headers,
            body,
        } => {
            let mut request = Request::new(method, path, body);
            request.headers.extend(headers);
            run_request(&socket, request).await
        }
    }
}
