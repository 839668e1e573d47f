//! Echo server.
//!
//! Demonstrates:
//! - Configuring and binding a server with the builder
//! - A delegate that echoes every message back
//! - Shutting down on Ctrl+C through a server handle
//!
//! Usage:
//!   cargo run --example echo
//!   cargo run --example echo -- --debug
//!   cargo run --example echo -- --port 8080

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tracing::info;
use tracing_subscriber::EnvFilter;
use websock::{ConnectionHandle, Delegate, Error, Message, Result, Server};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_PORT: u16 = 9999;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    port: u16,
}

impl Args {
    /// Parse command-line arguments.
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let port = args
            .iter()
            .position(|a| a == "--port")
            .and_then(|i| args.get(i + 1))
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            port,
        }
    }
}

/// Sends every message straight back.
struct Echo;

#[async_trait]
impl Delegate for Echo {
    async fn on_connect(&mut self, connection: &ConnectionHandle) {
        info!(id = %connection.id(), "Client connected");
    }

    async fn on_receive(&mut self, connection: &ConnectionHandle, message: Message) {
        if let Some(text) = message.as_text() {
            info!(id = %connection.id(), %text, "Echoing text");
        } else {
            info!(id = %connection.id(), len = message.len(), "Echoing binary");
        }

        if let Err(e) = connection.send(message).await {
            info!(id = %connection.id(), error = %e, "Echo failed");
        }
    }

    async fn on_error(&mut self, connection: &ConnectionHandle, error: Error) {
        info!(id = %connection.id(), %error, "Connection dropped");
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let server = Server::builder()
        .host("127.0.0.1")
        .port(args.port)
        .delegate(|| Echo)
        .build()
        .await?;

    let handle = server.handle();
    println!("Echo server on {}", handle.ws_url());
    println!("Press Ctrl+C to exit...");

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        handle.shutdown();
    });

    server.run().await
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug { "websock=trace,echo=debug" } else { "websock=info,echo=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}
