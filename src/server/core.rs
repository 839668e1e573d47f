//! Multiplexing server loop.
//!
//! One task owns the listener, every socket write half and the connection
//! table. It waits on four sources at once:
//!
//! | Source | Action |
//! |--------|--------|
//! | Listener | Accept, register a connection slot |
//! | Merged read streams | Feed bytes to the connection, dispatch events |
//! | Command queue | Apply sends, closes and queries from handles |
//! | Poll timer | Re-check the shutdown flag |
//!
//! Delegate hooks never run here; see
//! [`transport::delegate`](crate::transport::delegate).

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{AbortHandle, SelectAll, StreamExt};
use rustc_hash::FxHashMap;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpSocket, TcpStream, lookup_host};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::Endpoint;
use crate::transport::delegate::{DelegateEvent, Dispatcher};
use crate::transport::reader::{ReadEvent, ReadStream, read_stream};
use crate::transport::{Connection, ConnectionEvent, DelegateFactory};

use super::builder::ServerBuilder;
use super::handle::{CommandSender, ConnectionHandle, ServerCommand, ServerHandle};
use super::options::ServerOptions;

// ============================================================================
// Slot
// ============================================================================

/// Everything the loop keeps for one accepted socket.
struct Slot {
    /// Protocol state and write half.
    connection: Connection<OwnedWriteHalf>,
    /// Queue into the delegate task.
    dispatcher: Dispatcher,
    /// Stops the read stream.
    reader: AbortHandle,
    /// Remote address.
    peer: SocketAddr,
}

// ============================================================================
// Server
// ============================================================================

/// A bound WebSocket server.
///
/// Create with [`Server::builder()`], grab a [`ServerHandle`] if anything
/// needs to talk to the server later, then drive it with [`Server::run`].
pub struct Server {
    /// Listening socket.
    listener: TcpListener,
    /// Address advertised in handshake responses.
    endpoint: Arc<Endpoint>,
    /// Bound address.
    local_addr: SocketAddr,
    /// Loop tuning.
    options: ServerOptions,
    /// Creates one delegate per connection.
    factory: DelegateFactory,
    /// Cleared to stop the loop.
    running: Arc<AtomicBool>,
    /// Cloned into every handle.
    command_tx: CommandSender,
    /// Commands from handles.
    command_rx: mpsc::UnboundedReceiver<ServerCommand>,
    /// Connection table, keyed by id.
    connections: FxHashMap<ConnectionId, Slot>,
    /// Read streams of all registered connections.
    reads: SelectAll<ReadStream>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("connections", &self.connections.len())
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Server - Constructor & Accessors
// ============================================================================

impl Server {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Resolves the host and binds the listener.
    pub(crate) async fn bind(options: ServerOptions, factory: DelegateFactory) -> Result<Self> {
        let addr = lookup_host((options.host.as_str(), options.port))
            .await?
            .next()
            .ok_or_else(|| Error::config(format!("Host did not resolve: {}", options.host)))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(options.backlog)?;
        let local_addr = listener.local_addr()?;

        let endpoint = Arc::new(Endpoint::new(options.host.clone(), local_addr.port()));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        debug!(addr = %local_addr, backlog = options.backlog, "Listener bound");

        Ok(Self {
            listener,
            endpoint,
            local_addr,
            options,
            factory,
            running: Arc::new(AtomicBool::new(true)),
            command_tx,
            command_rx,
            connections: FxHashMap::default(),
            reads: SelectAll::new(),
        })
    }

    /// Returns the bound socket address.
    #[inline]
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns a handle usable after [`run`](Self::run) takes the server.
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle::new(
            self.command_tx.clone(),
            Arc::clone(&self.running),
            self.local_addr,
        )
    }
}

// ============================================================================
// Server - Event Loop
// ============================================================================

impl Server {
    /// Runs the loop until shutdown or a fatal listener error.
    ///
    /// Every connection is closed before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if accepting fails with a non-transient error.
    pub async fn run(mut self) -> Result<()> {
        info!(addr = %self.local_addr, "Server listening");

        let result = self.event_loop().await;
        self.close_all().await;

        info!(addr = %self.local_addr, "Server stopped");
        result
    }

    async fn event_loop(&mut self) -> Result<()> {
        let poll_interval = self.options.poll_interval;

        while self.running.load(Ordering::Acquire) {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.register(stream, peer),
                    Err(e) if is_transient_accept_error(&e) => {
                        warn!(error = %e, "Transient accept error, continuing");
                    }
                    Err(e) if is_resource_exhaustion(&e) => {
                        warn!(error = %e, backoff = ?poll_interval, "Out of resources while accepting, backing off");
                        sleep(poll_interval).await;
                    }
                    Err(e) => {
                        error!(error = %e, "Listener failed");
                        return Err(e.into());
                    }
                },

                Some((id, event)) = self.reads.next(), if !self.reads.is_empty() => {
                    self.handle_read(id, event).await;
                }

                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command).await;
                }

                () = sleep(poll_interval) => {}
            }
        }

        Ok(())
    }

    /// Creates the slot for a freshly accepted socket.
    fn register(&mut self, stream: TcpStream, peer: SocketAddr) {
        let id = ConnectionId::next();

        if let Err(e) = stream.set_nodelay(true) {
            trace!(id = %id, error = %e, "Failed to set TCP_NODELAY");
        }

        let (read_half, write_half) = stream.into_split();
        let (reads, reader) = read_stream(id, read_half, self.options.read_chunk_size);
        self.reads.push(reads);

        let connection = Connection::new(id, write_half, Arc::clone(&self.endpoint))
            .with_max_handshake_size(self.options.max_handshake_size);
        let handle = ConnectionHandle::new(id, self.command_tx.clone());
        let dispatcher = Dispatcher::spawn((self.factory)(), handle);

        self.connections.insert(
            id,
            Slot {
                connection,
                dispatcher,
                reader,
                peer,
            },
        );

        debug!(id = %id, %peer, active = self.connections.len(), "Connection accepted");
    }

    async fn handle_read(&mut self, id: ConnectionId, event: ReadEvent) {
        let data = match event {
            ReadEvent::Data(data) => data,
            ReadEvent::Eof => {
                debug!(id = %id, "Peer closed socket");
                self.deregister(id).await;
                return;
            }
            ReadEvent::Failed(e) => {
                warn!(id = %id, error = %e, "Read failed, dropping connection");
                if let Some(slot) = self.connections.get(&id) {
                    slot.dispatcher.dispatch(DelegateEvent::Failed(e.into()));
                }
                self.deregister(id).await;
                return;
            }
        };

        let Some(slot) = self.connections.get_mut(&id) else {
            trace!(id = %id, "Read for unregistered connection, ignoring");
            return;
        };

        let mut events = Vec::new();
        let result = slot.connection.feed_into(&data, &mut events).await;

        let mut closed = false;
        for event in events {
            match event {
                ConnectionEvent::Connected => slot.dispatcher.dispatch(DelegateEvent::Connected),
                ConnectionEvent::Message(message) => {
                    slot.dispatcher.dispatch(DelegateEvent::Received(message));
                }
                ConnectionEvent::Closed => closed = true,
            }
        }

        if let Err(e) = result {
            warn!(id = %id, peer = %slot.peer, error = %e, "Dropping connection");
            slot.dispatcher.dispatch(DelegateEvent::Failed(e));
            closed = true;
        }

        if closed {
            self.deregister(id).await;
        }
    }

    async fn handle_command(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::Send { id, message, reply } => {
                let result = match self.connections.get_mut(&id) {
                    Some(slot) => slot.connection.send(&message).await,
                    None => Err(Error::connection_not_found(id)),
                };
                let _ = reply.send(result);
            }
            ServerCommand::Close { id, reply } => {
                let result = if self.connections.contains_key(&id) {
                    self.deregister(id).await;
                    Ok(())
                } else {
                    Err(Error::connection_not_found(id))
                };
                let _ = reply.send(result);
            }
            ServerCommand::ConnectionCount { reply } => {
                let _ = reply.send(self.connections.len());
            }
            ServerCommand::Shutdown => {
                self.running.store(false, Ordering::Release);
            }
        }
    }

    /// Removes a connection, stops its reads and closes it.
    ///
    /// Dropping the slot drops the dispatcher, so the delegate task drains
    /// its queue and exits.
    async fn deregister(&mut self, id: ConnectionId) {
        let Some(mut slot) = self.connections.remove(&id) else {
            return;
        };

        slot.reader.abort();
        if let Err(e) = slot.connection.close().await {
            trace!(id = %id, error = %e, "Error while closing connection");
        }

        debug!(id = %id, active = self.connections.len(), "Connection removed");
    }

    async fn close_all(&mut self) {
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in ids {
            self.deregister(id).await;
        }
        self.running.store(false, Ordering::Release);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Returns `true` for accept errors caused by one client rather than by
/// the listening socket.
fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    )
}

/// Returns `true` when the process or kernel ran out of descriptors or
/// memory. The listener itself is still usable.
fn is_resource_exhaustion(e: &io::Error) -> bool {
    e.kind() == ErrorKind::OutOfMemory
        || e.raw_os_error().is_some_and(|code| RESOURCE_EXHAUSTION_ERRNOS.contains(&code))
}

/// ENOMEM, ENFILE, EMFILE, ENOBUFS.
#[cfg(target_os = "linux")]
const RESOURCE_EXHAUSTION_ERRNOS: [i32; 4] = [12, 23, 24, 105];

/// ENOMEM, ENFILE, EMFILE, ENOBUFS.
#[cfg(not(target_os = "linux"))]
const RESOURCE_EXHAUSTION_ERRNOS: [i32; 4] = [12, 23, 24, 55];

// ============================================================================
// Tests
// ============================================================================
