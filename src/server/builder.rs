//! Builder pattern for server configuration.
//!
//! Provides a fluent API for configuring and binding a [`Server`].
//!
//! # Example
//!
//! ```ignore
//! use async_trait::async_trait;
//! use websock::{ConnectionHandle, Delegate, Message, Server};
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
//! # async fn example() -> websock::Result<()> {
//! let server = Server::builder()
//!     .host("127.0.0.1")
//!     .port(9999)
//!     .delegate(|| Echo)
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{Delegate, DelegateFactory};

use super::core::Server;
use super::options::ServerOptions;

// ============================================================================
// ServerBuilder
// ============================================================================

/// Builder for configuring a [`Server`].
///
/// Use [`Server::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct ServerBuilder {
    /// Listening and tuning options.
    options: ServerOptions,
    /// Creates one delegate per connection.
    delegate: Option<DelegateFactory>,
}

impl fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("options", &self.options)
            .field("delegate", &self.delegate.is_some())
            .finish()
    }
}

// ============================================================================
// ServerBuilder Implementation
// ============================================================================

impl ServerBuilder {
    /// Creates a new builder with default options and no delegate.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the bind host.
    ///
    /// # Arguments
    ///
    /// * `host` - Host name or address (e.g., "127.0.0.1")
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = host.into();
        self
    }

    /// Sets the port. Use 0 for an OS-assigned port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.options.port = port;
        self
    }

    /// Sets the listen backlog.
    #[inline]
    #[must_use]
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.options.backlog = backlog;
        self
    }

    /// Sets the number of bytes requested per socket read.
    #[inline]
    #[must_use]
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.options.read_chunk_size = size;
        self
    }

    /// Sets how often the loop re-checks the shutdown flag.
    #[inline]
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    /// Sets the cap on buffered handshake bytes.
    #[inline]
    #[must_use]
    pub fn max_handshake_size(mut self, size: usize) -> Self {
        self.options.max_handshake_size = size;
        self
    }

    /// Sets the delegate factory.
    ///
    /// `factory` runs once per accepted connection.
    ///
    /// # Arguments
    ///
    /// * `factory` - Closure returning a fresh delegate
    #[must_use]
    pub fn delegate<D, F>(mut self, factory: F) -> Self
    where
        D: Delegate,
        F: Fn() -> D + Send + Sync + 'static,
    {
        self.delegate = Some(Arc::new(move || Box::new(factory()) as Box<dyn Delegate>));
        self
    }

    /// Sets the delegate factory directly.
    #[inline]
    #[must_use]
    pub fn delegate_factory(mut self, factory: DelegateFactory) -> Self {
        self.delegate = Some(factory);
        self
    }

    /// Validates the configuration and binds the listener.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no delegate is set or an option is invalid
    /// - [`Error::Io`] if the host cannot be resolved or bound
    pub async fn build(self) -> Result<Server> {
        let factory = self.validate_delegate()?;
        self.validate_options()?;

        Server::bind(self.options, factory).await
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ServerBuilder {
    /// Validates the delegate configuration.
    fn validate_delegate(&self) -> Result<DelegateFactory> {
        self.delegate.clone().ok_or_else(|| {
            Error::config(
                "Delegate is required. Use .delegate() to set it.\n\
                 Example: Server::builder().delegate(|| Echo)",
            )
        })
    }

    /// Validates the listening options.
    fn validate_options(&self) -> Result<()> {
        self.options.validate().map_err(Error::config)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::protocol::Message;
    use crate::server::ConnectionHandle;

    struct Silent;

    #[async_trait]
    impl Delegate for Silent {
        async fn on_receive(&mut self, _connection: &ConnectionHandle, _message: Message) {}
    }

    #[test]
    fn test_new_creates_default_builder() {
        let builder = ServerBuilder::new();
        assert_eq!(builder.options, ServerOptions::default());
        assert!(builder.delegate.is_none());
    }

    #[test]
    fn test_setters_update_options() {
        let builder = ServerBuilder::new()
            .host("127.0.0.1")
            .port(0)
            .backlog(16)
            .read_chunk_size(2048)
            .poll_interval(Duration::from_millis(10))
            .max_handshake_size(512);

        assert_eq!(builder.options.host, "127.0.0.1");
        assert_eq!(builder.options.port, 0);
        assert_eq!(builder.options.backlog, 16);
        assert_eq!(builder.options.read_chunk_size, 2048);
        assert_eq!(builder.options.poll_interval, Duration::from_millis(10));
        assert_eq!(builder.options.max_handshake_size, 512);
    }

    #[test]
    fn test_delegate_sets_factory() {
        let builder = ServerBuilder::new().delegate(|| Silent);
        assert!(builder.delegate.is_some());
        assert!(builder.validate_delegate().is_ok());
    }

    #[tokio::test]
    async fn test_build_without_delegate_fails() {
        let result = ServerBuilder::new().host("127.0.0.1").port(0).build().await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_build_with_invalid_options_fails() {
        let result = ServerBuilder::new()
            .port(0)
            .backlog(0)
            .delegate(|| Silent)
            .build()
            .await;

        match result {
            Err(Error::Config { message }) => assert!(message.contains("Backlog")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_build_binds_ephemeral_port() {
        let server = ServerBuilder::new()
            .host("127.0.0.1")
            .port(0)
            .delegate(|| Silent)
            .build()
            .await
            .expect("bind");

        assert_ne!(server.local_addr().port(), 0);
    }
}
