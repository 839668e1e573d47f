//! Per-connection transport.
//!
//! Everything between a raw socket and the application delegate.
//!
//! # Data Flow
//!
//! ```text
//! ┌──────────┐  bytes   ┌────────────┐  events  ┌────────────┐  hooks  ┌──────────┐
//! │  Socket  │─────────►│ Connection │─────────►│ Dispatcher │────────►│ Delegate │
//! │ (reader) │          │  (state)   │          │  (queue)   │         │  (app)   │
//! └──────────┘          └────────────┘          └────────────┘         └──────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Handshake/frame state machine |
//! | `delegate` | Application hooks and their dispatch tasks |
//! | `reader` | Socket read streams (internal) |

// ============================================================================
// Submodules
// ============================================================================

/// Connection state machine.
pub mod connection;

/// Application delegates.
pub mod delegate;

/// Socket read streams.
pub(crate) mod reader;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ConnectionEvent, ConnectionState, DEFAULT_MAX_HANDSHAKE_SIZE};
pub use delegate::{Delegate, DelegateFactory};
