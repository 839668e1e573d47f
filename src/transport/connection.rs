//! Per-connection protocol state machine.
//!
//! A [`Connection`] owns the write side of one socket and turns the raw
//! bytes read from it into [`ConnectionEvent`]s.
//!
//! # States
//!
//! ```text
//! AwaitingHandshake ──(101 sent)──► Open ──(close frame)──► Closed
//!         │                          │                        ▲
//!         └──────(error / EOF)───────┴────(error / EOF)───────┘
//! ```
//!
//! `Closed` is terminal. Before the handshake, bytes are buffered until the
//! header block is complete; anything pipelined behind it is decoded as a
//! frame straight away. After the handshake every read must hold exactly
//! one frame.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::frame::{self, Opcode};
use crate::protocol::handshake::{self, Endpoint};
use crate::protocol::Message;

// ============================================================================
// Constants
// ============================================================================

/// Default cap on buffered handshake bytes.
pub const DEFAULT_MAX_HANDSHAKE_SIZE: usize = 8 * 1024;

/// Close status sent on a normal server-initiated close.
const CLOSE_NORMAL: u16 = 1000;

/// Close status sent after a protocol violation.
const CLOSE_PROTOCOL_ERROR: u16 = 1002;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Buffering the upgrade request.
    AwaitingHandshake,
    /// Handshake done, exchanging frames.
    Open,
    /// Socket shut down. Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingHandshake => "awaiting handshake",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ConnectionEvent
// ============================================================================

/// Something the owner of a connection must react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Handshake completed.
    Connected,
    /// A data frame was decoded.
    Message(Message),
    /// The peer sent a close frame and the socket was shut down.
    Closed,
}

// ============================================================================
// Connection
// ============================================================================

/// Protocol state of one client socket.
///
/// Generic over the write half so the state machine can be driven against
/// in-memory writers.
pub struct Connection<W> {
    /// Connection id.
    id: ConnectionId,
    /// Current state.
    state: ConnectionState,
    /// Handshake bytes received so far.
    buffer: Vec<u8>,
    /// Cap on `buffer`.
    max_handshake_size: usize,
    /// Address advertised in the handshake response.
    endpoint: Arc<Endpoint>,
    /// Write side of the socket.
    writer: W,
}

impl<W> fmt::Debug for Connection<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Constructor & Accessors
// ============================================================================

impl<W> Connection<W> {
    /// Creates a connection awaiting its handshake.
    #[must_use]
    pub fn new(id: ConnectionId, writer: W, endpoint: Arc<Endpoint>) -> Self {
        Self {
            id,
            state: ConnectionState::AwaitingHandshake,
            buffer: Vec::new(),
            max_handshake_size: DEFAULT_MAX_HANDSHAKE_SIZE,
            endpoint,
            writer,
        }
    }

    /// Sets the cap on buffered handshake bytes.
    #[inline]
    #[must_use]
    pub fn with_max_handshake_size(mut self, max: usize) -> Self {
        self.max_handshake_size = max;
        self
    }

    /// Returns the connection id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns `true` once the handshake has completed and until close.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Returns a reference to the writer.
    #[inline]
    #[must_use]
    pub const fn get_ref(&self) -> &W {
        &self.writer
    }
}

// ============================================================================
// Connection - Feeding
// ============================================================================

impl<W: AsyncWrite + Unpin> Connection<W> {
    /// Feeds bytes read from the socket.
    ///
    /// Returns the events produced. An incomplete handshake produces none
    /// and keeps the bytes buffered for the next call.
    ///
    /// # Errors
    ///
    /// See [`feed_into`](Self::feed_into). Events produced before the error
    /// are dropped; use `feed_into` to keep them.
    pub async fn feed(&mut self, data: &[u8]) -> Result<Vec<ConnectionEvent>> {
        let mut events = Vec::new();
        self.feed_into(data, &mut events).await?;
        Ok(events)
    }

    /// Feeds bytes read from the socket, appending events to `events`.
    ///
    /// Events pushed before a failure stay in `events`: a handshake that
    /// completes with a bad frame pipelined behind it still yields
    /// [`ConnectionEvent::Connected`].
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is already closed
    /// - Handshake and framing errors; the connection is closed before the
    ///   error is returned
    /// - [`Error::Io`] if writing a reply fails
    pub async fn feed_into(&mut self, data: &[u8], events: &mut Vec<ConnectionEvent>) -> Result<()> {
        let result = match self.state {
            ConnectionState::AwaitingHandshake => self.feed_handshake(data, events).await,
            ConnectionState::Open => self.feed_frame(data).await.map(|event| events.extend(event)),
            ConnectionState::Closed => return Err(Error::ConnectionClosed),
        };

        if let Err(e) = &result
            && e.is_protocol_error()
        {
            self.reject(e).await;
        }

        result
    }

    /// Buffers handshake bytes and negotiates once the header is complete.
    ///
    /// The size cap applies only while the terminator is missing; bytes
    /// pipelined behind a complete header are never counted against it.
    async fn feed_handshake(&mut self, data: &[u8], events: &mut Vec<ConnectionEvent>) -> Result<()> {
        self.buffer.extend_from_slice(data);

        let negotiation = match handshake::negotiate(&self.buffer, &self.endpoint) {
            Ok(negotiation) => negotiation,
            Err(Error::HandshakeIncomplete) if self.buffer.len() > self.max_handshake_size => {
                return Err(Error::handshake_malformed(format!(
                    "handshake exceeds {} bytes",
                    self.max_handshake_size
                )));
            }
            Err(Error::HandshakeIncomplete) => {
                trace!(id = %self.id, buffered = self.buffer.len(), "Handshake incomplete, buffering");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.write(&negotiation.response).await?;
        self.state = ConnectionState::Open;

        let buffer = std::mem::take(&mut self.buffer);
        let trailing = &buffer[negotiation.consumed..];

        debug!(
            id = %self.id,
            path = %negotiation.request.target,
            trailing = trailing.len(),
            "Handshake complete"
        );

        events.push(ConnectionEvent::Connected);
        if !trailing.is_empty() {
            events.extend(self.feed_frame(trailing).await?);
        }
        Ok(())
    }

    /// Decodes one frame and applies its side effects.
    async fn feed_frame(&mut self, data: &[u8]) -> Result<Option<ConnectionEvent>> {
        let frame = frame::decode(data)?;
        trace!(id = %self.id, opcode = %frame.opcode, len = frame.payload.len(), "Frame decoded");

        match frame.opcode {
            Opcode::Continuation | Opcode::Text | Opcode::Binary => {
                Ok(Message::from_frame(frame).map(ConnectionEvent::Message))
            }
            Opcode::Ping => {
                let pong = frame::encode(&frame.payload, Opcode::Pong, false);
                self.write(&pong).await?;
                trace!(id = %self.id, "Pong sent");
                Ok(None)
            }
            Opcode::Close => {
                let echo = frame::encode(&frame.payload, Opcode::Close, false);
                if let Err(e) = self.write(&echo).await {
                    trace!(id = %self.id, error = %e, "Failed to echo close frame");
                }
                self.shutdown().await?;
                debug!(id = %self.id, "Closed by peer");
                Ok(Some(ConnectionEvent::Closed))
            }
            Opcode::Pong => Err(Error::unsupported_opcode(Opcode::Pong.as_u8())),
        }
    }

    /// Tells the peer why it is being dropped, then shuts down.
    async fn reject(&mut self, error: &Error) {
        let reply = match self.state {
            ConnectionState::AwaitingHandshake => handshake::render_bad_request(&error.to_string()),
            ConnectionState::Open => {
                frame::encode(&CLOSE_PROTOCOL_ERROR.to_be_bytes(), Opcode::Close, false)
            }
            ConnectionState::Closed => return,
        };

        if let Err(e) = self.write(&reply).await {
            trace!(id = %self.id, error = %e, "Failed to send rejection");
        }
        if let Err(e) = self.shutdown().await {
            trace!(id = %self.id, error = %e, "Failed to shut down rejected connection");
        }
    }
}

// ============================================================================
// Connection - Sending & Closing
// ============================================================================

impl<W: AsyncWrite + Unpin> Connection<W> {
    /// Sends a message as one unmasked frame.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`] unless the connection is open
    /// - [`Error::Io`] if the write fails
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Err(Error::not_open(self.state));
        }

        let encoded = frame::encode(message.as_bytes(), message.opcode(), false);
        self.write(&encoded).await?;
        trace!(id = %self.id, len = message.len(), "Message sent");
        Ok(())
    }

    /// Closes the connection. Idempotent.
    ///
    /// An open connection gets a normal close frame first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if shutting the socket down fails.
    pub async fn close(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Closed => return Ok(()),
            ConnectionState::Open => {
                let frame = frame::encode(&CLOSE_NORMAL.to_be_bytes(), Opcode::Close, false);
                if let Err(e) = self.write(&frame).await {
                    trace!(id = %self.id, error = %e, "Failed to send close frame");
                }
            }
            ConnectionState::AwaitingHandshake => {}
        }

        self.shutdown().await
    }

    /// Enters `Closed` and shuts the write side down.
    async fn shutdown(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.state = ConnectionState::Closed;
        self.buffer = Vec::new();
        self.writer.shutdown().await?;
        Ok(())
    }

    /// Writes and flushes.
    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
