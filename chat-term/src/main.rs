//! chat-term — entry point.
//!
//! ```text
//! chat-term request --url /api/v1/ping       One request, print the reply
//! chat-term chat                             Handshake, then relay stdin
//! chat-term --config <path> ...              Use custom config TOML
//! chat-term --gen-config                     Dump default config and exit
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chat_core::{PROTO_HTTP, Request, SessionManager, SocketConnection, transact};

use chat_term::chat::{ChatPrinter, relay_lines};
use chat_term::config::ClientConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "chat-term", about = "Terminal client for the chat server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "chat-term.toml")]
    config: PathBuf,

    /// Server address (overrides config). Example: 127.0.0.1:8080
    #[arg(short, long)]
    server: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to `--config` and exit.
    #[arg(long)]
    write_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one request and print the response.
    Request {
        /// Request path, e.g. /api/v1/signin
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Request body, conventionally JSON.
        #[arg(long, default_value = "")]
        body: String,
        /// Extra header as key=value. Repeatable.
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
    /// Open a chat session: print pushed frames, send stdin lines.
    Chat {
        /// Handshake endpoint (overrides config).
        #[arg(long)]
        url: Option<String>,
    },
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected key=value, got {s:?}"))
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }
    if cli.write_config {
        ClientConfig::write_default(&cli.config)?;
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config);
    if let Some(addr) = cli.server.as_deref() {
        config.override_server(addr)?;
    }

    init_tracing(&config)?;
    info!("chat-term v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Command::Request {
            url,
            method,
            body,
            headers,
        }) => run_request(&config, method, url, body, headers).await,
        Some(Command::Chat { url }) => run_chat(&config, url).await,
        None => {
            warn!("no command given; try `chat-term --help`");
            Ok(())
        }
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.file.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
    Ok(())
}

// ── Commands ─────────────────────────────────────────────────────

async fn run_request(
    config: &ClientConfig,
    method: String,
    url: String,
    body: String,
    headers: Vec<(String, String)>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = Request::new(method, url, PROTO_HTTP)
        .with_header("Content-Type", "application/json")
        .with_body(body);
    for (key, value) in headers {
        request = request.with_header(key, value);
    }

    let server = config.network.server();
    let response = transact(&server, config.network.request_timeout(), &request).await;
    info!(server = %server, status = %response.code(), "request finished");

    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.is_success() {
        return Err(format!("request failed: {} {}", response.status_code, response.status).into());
    }
    Ok(())
}

async fn run_chat(config: &ClientConfig, url: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = url.unwrap_or_else(|| config.session.endpoint.clone());
    let server = config.network.server();
    let conn = SocketConnection::new(server.clone());

    let manager = SessionManager::new(config.session.handshake_timeout()).with_endpoint(endpoint);
    let response = manager.connect(&conn, Arc::new(ChatPrinter)).await;
    if !response.is_success() {
        error!(server = %server, status = %response.code(), reason = %response.status, "handshake failed");
        let _ = conn.close();
        return Err(format!("handshake failed: {} {}", response.status_code, response.status).into());
    }
    info!(server = %server, "connected; type messages, Ctrl-D to quit");

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        sent = relay_lines(&conn, stdin) => {
            let sent = sent?;
            info!(sent, "stdin closed");
        }
        _ = conn.closed() => {
            warn!(server = %server, "server closed the session");
        }
    }

    if conn.is_connected() {
        conn.close()?;
        conn.closed().await;
    }
    Ok(())
}
