//! # Core Engine Module
//!
//! Connection and session handling for the realtime protocol.
//!
//! ## Core Components:
//!
//! - **`connection_manager`**: accepts transport connections, assigns session
//!   ids and opens a `Session` for each.
//!
//! - **`session`**: per-connection state machine. Reassembles frames, holds
//!   the presented credential and sends replies through the outbound channel.
//!
//! - **`dispatcher`**: routes each request to its handler and drives listen
//!   subscriptions.
//!
//! - **`write_pipeline`**: the staged set and merge flows, including the
//!   hash-checked transactional set.
//!
//! - **`registry`**: the listeners a session holds, released on unlisten or
//!   close.
//!
//! - **`memory_guard`**: process-wide budget for partially received frames.
//!
//! - **`server`**: bundles the collaborators and exposes runtime controls.

#![forbid(unsafe_code)]

/// Accepts connections and opens sessions.
pub mod connection_manager;
/// Routes requests to their handlers.
pub mod dispatcher;
/// Global budget for buffered inbound bytes.
pub mod memory_guard;
/// Per-session listener bookkeeping.
pub mod registry;
/// Store, rules, tokens and clock bundled with runtime controls.
pub mod server;
/// The per-connection state machine.
pub mod session;
/// Staged set and merge handling.
pub mod write_pipeline;

// --- Public API Re-exports ---
pub use connection_manager::ConnectionManager;
pub use memory_guard::BufferGuard;
pub use registry::{ListenKey, ListenerRegistry};
pub use server::RtdbServer;
pub use session::{AuthState, Session, SessionContext, SessionId, SessionState};
