//! WebSocket wire protocol.
//!
//! Pure, I/O-free building blocks used by the connection state machine.
//!
//! # Protocol Overview
//!
//! | Phase | Direction | Module |
//! |-------|-----------|--------|
//! | Upgrade request | Client → Server | `handshake` |
//! | `101` response | Server → Client | `handshake` |
//! | Data and control frames | Both | `frame` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Frame codec, opcodes, masking |
//! | `handshake` | Upgrade request parsing and response rendering |
//! | `message` | Application messages handed to delegates |

// ============================================================================
// Submodules
// ============================================================================

/// Frame codec (RFC 6455 Section 5).
pub mod frame;

/// HTTP upgrade handshake.
pub mod handshake;

/// Application-level messages.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{Frame, Opcode, apply_mask, decode, encode, encode_with_key};
pub use handshake::{
    Challenge, Endpoint, HandshakeRequest, Negotiation, compute_accept_key, negotiate,
};
pub use message::Message;
