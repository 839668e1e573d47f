//! Handles for talking to a running server.
//!
//! The server loop owns every socket. Handles never touch sockets
//! directly: they post [`ServerCommand`]s to the loop and wait for its
//! reply, so all writes are serialised through one owner.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::Message;

// ============================================================================
// ServerCommand
// ============================================================================

/// Request posted to the server loop.
#[derive(Debug)]
pub(crate) enum ServerCommand {
    /// Send a message on one connection.
    Send {
        id: ConnectionId,
        message: Message,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Close one connection.
    Close {
        id: ConnectionId,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Report the number of registered connections.
    ConnectionCount { reply: oneshot::Sender<usize> },
    /// Stop the loop and close everything.
    Shutdown,
}

/// Sending side of the command queue.
pub(crate) type CommandSender = mpsc::UnboundedSender<ServerCommand>;

// ============================================================================
// ConnectionHandle
// ============================================================================

/// Handle to one connection, given to its [`Delegate`](crate::Delegate).
///
/// Cheap to clone. Operations fail with [`Error::ConnectionClosed`] once
/// the server loop has stopped.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Connection id.
    id: ConnectionId,
    /// Command queue into the server loop.
    commands: CommandSender,
}

impl ConnectionHandle {
    /// Creates a handle for connection `id`.
    pub(crate) fn new(id: ConnectionId, commands: CommandSender) -> Self {
        Self { id, commands }
    }

    /// Returns the connection id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Sends a message as one unmasked frame.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`] if the connection is not open
    /// - [`Error::ConnectionNotFound`] if the connection has been dropped
    /// - [`Error::ConnectionClosed`] if the server has stopped
    /// - [`Error::Io`] if the write fails
    pub async fn send(&self, message: Message) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.post(ServerCommand::Send {
            id: self.id,
            message,
            reply,
        })?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Sends a text message.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Message::text(text)).await
    }

    /// Sends a binary message.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Message::binary(data)).await
    }

    /// Closes the connection with a normal close frame.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionNotFound`] if the connection has been dropped
    /// - [`Error::ConnectionClosed`] if the server has stopped
    pub async fn close(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.post(ServerCommand::Close { id: self.id, reply })?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    fn post(&self, command: ServerCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::ConnectionClosed)
    }
}

// ============================================================================
// ServerHandle
// ============================================================================

/// Handle to a server, usable from any task.
///
/// Obtained from [`Server::handle`](super::Server::handle) before
/// [`Server::run`](super::Server::run) consumes the server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    /// Command queue into the server loop.
    commands: CommandSender,
    /// Cleared on shutdown.
    running: Arc<AtomicBool>,
    /// Bound address.
    local_addr: SocketAddr,
}

impl ServerHandle {
    pub(crate) fn new(commands: CommandSender, running: Arc<AtomicBool>, local_addr: SocketAddr) -> Self {
        Self {
            commands,
            running,
            local_addr,
        }
    }

    /// Returns the bound socket address.
    #[inline]
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns a `ws://` URL for the bound address.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}/", self.local_addr)
    }

    /// Returns `true` until shutdown has been requested.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns the number of registered connections.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the server has stopped.
    pub async fn connection_count(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(ServerCommand::ConnectionCount { reply })
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(rx.await?)
    }

    /// Requests shutdown.
    ///
    /// The loop notices within one poll interval, closes every connection
    /// and returns from [`Server::run`](super::Server::run). Idempotent.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            debug!(addr = %self.local_addr, "Shutdown requested");
            // Wakes the loop early; the flag alone is enough otherwise.
            let _ = self.commands.send(ServerCommand::Shutdown);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 9999))
    }

    #[tokio::test]
    async fn test_send_posts_command_and_returns_reply() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = ConnectionId::next();
        let handle = ConnectionHandle::new(id, tx);

        let loop_side = tokio::spawn(async move {
            match rx.recv().await {
                Some(ServerCommand::Send { id: got, message, reply }) => {
                    assert_eq!(got, id);
                    assert_eq!(message, Message::text("hi"));
                    let _ = reply.send(Ok(()));
                }
                other => panic!("unexpected command: {other:?}"),
            }
        });

        handle.send_text("hi").await.expect("send");
        loop_side.await.expect("loop side");
    }

    #[tokio::test]
    async fn test_send_after_loop_stopped_fails() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = ConnectionHandle::new(ConnectionId::next(), tx);

        assert!(matches!(
            handle.send_binary(vec![1, 2]).await,
            Err(Error::ConnectionClosed)
        ));
        assert!(matches!(handle.close().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_dropped_reply_maps_to_connection_closed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(ConnectionId::next(), tx);

        tokio::spawn(async move {
            // Drop the command, and its reply sender, unanswered.
            let _ = rx.recv().await;
        });

        assert!(matches!(handle.close().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_server_handle_accessors_and_shutdown() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));
        let handle = ServerHandle::new(tx, Arc::clone(&running), addr());

        assert_eq!(handle.port(), 9999);
        assert_eq!(handle.ws_url(), "ws://127.0.0.1:9999/");
        assert!(handle.is_running());

        handle.shutdown();
        handle.shutdown();

        assert!(!handle.is_running());
        assert!(!running.load(Ordering::Acquire));
        assert!(matches!(rx.recv().await, Some(ServerCommand::Shutdown)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connection_count_round_trip() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ServerHandle::new(tx, Arc::new(AtomicBool::new(true)), addr());

        tokio::spawn(async move {
            if let Some(ServerCommand::ConnectionCount { reply }) = rx.recv().await {
                let _ = reply.send(3);
            }
        });

        assert_eq!(handle.connection_count().await.expect("count"), 3);
    }
}
