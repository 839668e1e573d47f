//! websock - a small multiplexing WebSocket server engine.
//!
//! Accepts TCP clients, completes the HTTP upgrade handshake (RFC 6455 and
//! the legacy hixie-76 challenge), decodes client frames and hands
//! application messages to a per-connection [`Delegate`].
//!
//! # Architecture
//!
//! - One loop task owns the listener, every socket and the connection table
//! - Each connection has a protocol state machine ([`transport::Connection`])
//! - Delegate hooks run on a per-connection dispatcher task, in wire order
//! - Delegates talk back through a [`ConnectionHandle`]; the loop does the I/O
//!
//! # Quick Start
//!
//! ```no_run
//! use async_trait::async_trait;
//! use websock::{ConnectionHandle, Delegate, Message, Result, Server};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Delegate for Echo {
//!     async fn on_receive(&mut self, connection: &ConnectionHandle, message: Message) {
//!         let _ = connection.send(message).await;
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = Server::builder()
//!         .host("127.0.0.1")
//!         .port(9999)
//!         .delegate(|| Echo)
//!         .build()
//!         .await?;
//!
//!     let handle = server.handle();
//!     println!("Listening on {}", handle.ws_url());
//!
//!     server.run().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Connection ids |
//! | [`protocol`] | Handshake and frame codec (I/O-free) |
//! | [`server`] | Builder, loop and handles |
//! | [`transport`] | Connection state machine and delegates |
//!
//! # Limitations
//!
//! - A frame must arrive within a single read; no reassembly across reads
//! - Fragmented messages are delivered frame by frame
//! - Writes are unbuffered; a slow client can stall the loop

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe connection identifiers.
pub mod identifiers;

/// WebSocket wire protocol.
///
/// Handshake negotiation and the frame codec, free of I/O.
pub mod protocol;

/// Server builder, event loop and handles.
pub mod server;

/// Per-connection transport.
///
/// Connection state machine, delegates and socket readers.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use identifiers::ConnectionId;
pub use protocol::{Message, Opcode};
pub use server::{ConnectionHandle, Server, ServerBuilder, ServerHandle, ServerOptions};
pub use transport::Delegate;
