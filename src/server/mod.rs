//! WebSocket server.
//!
//! # Lifecycle
//!
//! 1. `Server::builder()` - configure host, port and delegate
//! 2. `ServerBuilder::build` - validate and bind the listener
//! 3. `Server::handle` - keep a handle for status queries and shutdown
//! 4. `Server::run` - drive the loop until shutdown
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent configuration |
//! | `core` | The accept/read loop |
//! | `handle` | Handles posting commands to the loop |
//! | `options` | Listening endpoint and tuning |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent server configuration.
pub mod builder;

/// Accept/read loop.
pub mod core;

/// Server and connection handles.
pub mod handle;

/// Listening and tuning options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ServerBuilder;
pub use core::Server;
pub use handle::{ConnectionHandle, ServerHandle};
pub use options::ServerOptions;
