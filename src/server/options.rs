//! Server listening and tuning options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use websock::ServerOptions;
//!
//! let options = ServerOptions::new()
//!     .with_host("0.0.0.0")
//!     .with_port(8080)
//!     .with_poll_interval(Duration::from_millis(250));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::transport::connection::DEFAULT_MAX_HANDSHAKE_SIZE;

// ============================================================================
// Constants
// ============================================================================

/// Default bind host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default port.
pub const DEFAULT_PORT: u16 = 9999;

/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 5;

/// Default size of one socket read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// Default upper bound on one readiness wait.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// ServerOptions
// ============================================================================

/// Listening endpoint and loop tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Host to bind; also advertised in `WebSocket-Location`.
    pub host: String,

    /// Port to bind (0 for an OS-assigned port).
    pub port: u16,

    /// Listen backlog.
    pub backlog: u32,

    /// Bytes requested per socket read.
    ///
    /// A frame must arrive within one read, so this bounds the largest
    /// frame a client can send.
    pub read_chunk_size: usize,

    /// Longest the loop waits before re-checking the shutdown flag.
    pub poll_interval: Duration,

    /// Cap on buffered handshake bytes per connection.
    pub max_handshake_size: usize,
}

// ============================================================================
// Constructors
// ============================================================================

impl ServerOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_handshake_size: DEFAULT_MAX_HANDSHAKE_SIZE,
        }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ServerOptions {
    /// Sets the bind host.
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the listen backlog.
    #[inline]
    #[must_use]
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Sets the read chunk size.
    #[inline]
    #[must_use]
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    /// Sets the poll interval.
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the handshake size cap.
    #[inline]
    #[must_use]
    pub fn with_max_handshake_size(mut self, size: usize) -> Self {
        self.max_handshake_size = size;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ServerOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("Host must not be empty".to_string());
        }
        if self.backlog == 0 {
            return Err("Backlog must be greater than zero".to_string());
        }
        if self.read_chunk_size < 2 {
            return Err("Read chunk size must hold at least a frame header (2 bytes)".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("Poll interval must be greater than zero".to_string());
        }
        if self.max_handshake_size == 0 {
            return Err("Handshake size cap must be greater than zero".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
