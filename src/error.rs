//! Error types for the WebSocket engine.
//!
//! This module defines the single closed error type used throughout the
//! crate. Protocol errors are raised by the handshake negotiator and the
//! frame codec; the server catches them at its boundary and drops only the
//! offending connection.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use websock::{Error, Result, protocol::frame};
//!
//! fn first_frame(buffer: &[u8]) -> Result<()> {
//!     let frame = frame::decode(buffer)?;
//!     println!("{:?} with {} bytes", frame.opcode, frame.payload.len());
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Handshake | [`Error::HandshakeIncomplete`], [`Error::HandshakeMalformed`] |
//! | Framing | [`Error::FrameTooShort`], [`Error::FrameLengthMismatch`], [`Error::ClientMustMask`], [`Error::UnsupportedOpcode`] |
//! | Connection | [`Error::NotOpen`], [`Error::ConnectionClosed`], [`Error::ConnectionNotFound`] |
//! | Configuration | [`Error::Config`] |
//! | External | [`Error::Io`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

use crate::identifiers::ConnectionId;
use crate::transport::ConnectionState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// The header block has not been terminated yet.
    ///
    /// Recoverable: the caller keeps the buffered bytes and retries once
    /// more data has arrived.
    #[error("Handshake incomplete: header terminator not received yet")]
    HandshakeIncomplete,

    /// The upgrade request cannot be accepted.
    #[error("Malformed handshake: {message}")]
    HandshakeMalformed {
        /// Why the request was rejected.
        message: String,
    },

    // ========================================================================
    // Framing Errors
    // ========================================================================
    /// Fewer bytes than the frame header requires.
    #[error("Frame too short: {len} bytes")]
    FrameTooShort {
        /// Number of bytes that were available.
        len: usize,
    },

    /// Declared payload length disagrees with the bytes received.
    #[error("Frame declared {declared} payload bytes but carried {actual}")]
    FrameLengthMismatch {
        /// Length from the frame header.
        declared: u64,
        /// Bytes actually following the header.
        actual: u64,
    },

    /// A client data frame arrived without the mask bit.
    #[error("Client did not mask data frame")]
    ClientMustMask,

    /// Opcode outside the supported set.
    #[error("Unsupported opcode: 0x{opcode:X}")]
    UnsupportedOpcode {
        /// The raw 4-bit opcode.
        opcode: u8,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Operation requires an open connection.
    #[error("Connection is not open (state: {state})")]
    NotOpen {
        /// State the connection was in.
        state: ConnectionState,
    },

    /// Connection closed, or the server loop has gone away.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No connection registered under this id.
    #[error("Connection not found: {id}")]
    ConnectionNotFound {
        /// The unknown connection id.
        id: ConnectionId,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when server options fail validation.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a malformed handshake error.
    #[inline]
    pub fn handshake_malformed(message: impl Into<String>) -> Self {
        Self::HandshakeMalformed {
            message: message.into(),
        }
    }

    /// Creates a frame too short error.
    #[inline]
    pub fn frame_too_short(len: usize) -> Self {
        Self::FrameTooShort { len }
    }

    /// Creates a length mismatch error.
    #[inline]
    pub fn frame_length_mismatch(declared: u64, actual: u64) -> Self {
        Self::FrameLengthMismatch { declared, actual }
    }

    /// Creates an unsupported opcode error.
    #[inline]
    pub fn unsupported_opcode(opcode: u8) -> Self {
        Self::UnsupportedOpcode { opcode }
    }

    /// Creates a not-open error.
    #[inline]
    pub fn not_open(state: ConnectionState) -> Self {
        Self::NotOpen { state }
    }

    /// Creates a connection not found error.
    #[inline]
    pub fn connection_not_found(id: ConnectionId) -> Self {
        Self::ConnectionNotFound { id }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error was raised by the handshake negotiator.
    #[inline]
    #[must_use]
    pub fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            Self::HandshakeIncomplete | Self::HandshakeMalformed { .. }
        )
    }

    /// Returns `true` if the peer violated the wire protocol.
    ///
    /// Protocol errors are fatal to the offending connection only.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::HandshakeMalformed { .. }
                | Self::FrameTooShort { .. }
                | Self::FrameLengthMismatch { .. }
                | Self::ClientMustMask
                | Self::UnsupportedOpcode { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Only an unterminated handshake is: buffer and retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::HandshakeIncomplete)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::handshake_malformed("missing Sec-WebSocket-Key");
        assert_eq!(
            err.to_string(),
            "Malformed handshake: missing Sec-WebSocket-Key"
        );

        let err = Error::frame_length_mismatch(5, 3);
        assert_eq!(
            err.to_string(),
            "Frame declared 5 payload bytes but carried 3"
        );

        let err = Error::unsupported_opcode(0xB);
        assert_eq!(err.to_string(), "Unsupported opcode: 0xB");
    }

    #[test]
    fn test_not_open_display() {
        let err = Error::not_open(ConnectionState::Closed);
        assert_eq!(err.to_string(), "Connection is not open (state: closed)");
    }

    #[test]
    fn test_is_protocol_error() {
        assert!(Error::ClientMustMask.is_protocol_error());
        assert!(Error::frame_too_short(1).is_protocol_error());
        assert!(Error::handshake_malformed("x").is_protocol_error());
        assert!(!Error::HandshakeIncomplete.is_protocol_error());
        assert!(!Error::ConnectionClosed.is_protocol_error());
    }

    #[test]
    fn test_is_handshake_error() {
        assert!(Error::HandshakeIncomplete.is_handshake_error());
        assert!(Error::handshake_malformed("x").is_handshake_error());
        assert!(!Error::ClientMustMask.is_handshake_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::HandshakeIncomplete.is_recoverable());
        assert!(!Error::handshake_malformed("x").is_recoverable());
        assert!(!Error::unsupported_opcode(3).is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionReset, "reset");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
