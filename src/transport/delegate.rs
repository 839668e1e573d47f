//! Application delegates and their dispatch tasks.
//!
//! The server creates one [`Delegate`] per accepted connection. Its hooks
//! never run on the server loop: each connection gets a dispatcher task
//! fed through an unbounded FIFO queue.
//!
//! # Ordering
//!
//! Hooks of one connection run one at a time, in the order the server
//! produced them, so messages reach `on_receive` in wire order. Hooks of
//! different connections run concurrently.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::Error;
use crate::protocol::Message;
use crate::server::ConnectionHandle;

// ============================================================================
// Delegate
// ============================================================================

/// Application callbacks for one connection.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use websock::{ConnectionHandle, Delegate, Message};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Delegate for Echo {
///     async fn on_receive(&mut self, connection: &ConnectionHandle, message: Message) {
///         let _ = connection.send(message).await;
///     }
/// }
/// ```
#[async_trait]
pub trait Delegate: Send + 'static {
    /// Called once the handshake has completed.
    async fn on_connect(&mut self, _connection: &ConnectionHandle) {}

    /// Called for every decoded data frame.
    async fn on_receive(&mut self, connection: &ConnectionHandle, message: Message);

    /// Called when the connection is dropped because of an error.
    async fn on_error(&mut self, _connection: &ConnectionHandle, _error: Error) {}
}

/// Creates one delegate per accepted connection.
pub type DelegateFactory = Arc<dyn Fn() -> Box<dyn Delegate> + Send + Sync>;

// ============================================================================
// DelegateEvent
// ============================================================================

/// Hook invocation queued for a dispatcher.
#[derive(Debug)]
pub(crate) enum DelegateEvent {
    /// Run `on_connect`.
    Connected,
    /// Run `on_receive`.
    Received(Message),
    /// Run `on_error`.
    Failed(Error),
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Queue into one connection's delegate task.
///
/// Dropping the dispatcher lets the task finish the queued hooks and exit.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    /// Sending side of the hook queue.
    events: mpsc::UnboundedSender<DelegateEvent>,
}

impl Dispatcher {
    /// Spawns the task that owns `delegate`.
    pub(crate) fn spawn(delegate: Box<dyn Delegate>, connection: ConnectionHandle) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::run(delegate, connection, rx));
        Self { events }
    }

    /// Queues a hook invocation.
    pub(crate) fn dispatch(&self, event: DelegateEvent) {
        if self.events.send(event).is_err() {
            trace!("Delegate task already finished, dropping event");
        }
    }

    /// Runs hooks in queue order until every sender is gone.
    async fn run(
        mut delegate: Box<dyn Delegate>,
        connection: ConnectionHandle,
        mut events: mpsc::UnboundedReceiver<DelegateEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                DelegateEvent::Connected => delegate.on_connect(&connection).await,
                DelegateEvent::Received(message) => {
                    delegate.on_receive(&connection, message).await;
                }
                DelegateEvent::Failed(error) => delegate.on_error(&connection, error).await,
            }
        }

        trace!(id = %connection.id(), "Delegate task finished");
    }
}

// ============================================================================
// Tests
// ============================================================================
