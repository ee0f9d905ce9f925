//! Engine for a realtime-database compatible server.
//!
//! A transport accepts connections through [`core::ConnectionManager`], feeds
//! inbound text frames to the returned [`core::Session`] and forwards
//! whatever the session writes to its outbound channel. Everything between,
//! from frame reassembly through rule checks to the data tree, lives here.

// Declare the modules to re-export
pub mod auth;
pub mod configs;
pub mod core;
pub mod data;
pub mod error;
#[cfg(feature = "loggers")]
pub mod loggers;
pub mod protocol;
pub mod rules;
pub mod store;
pub mod utils;

// Re-export the main entry points
pub use crate::configs::ServerOptions;
pub use crate::core::{ConnectionManager, RtdbServer, Session};
pub use crate::error::{Result, RtdbError};
pub use crate::rules::{OpenRules, PathRules, RuleDecision, RuleGate};
pub use crate::store::{MemoryStore, Store};
pub use crate::utils::clock::{Clock, TimeSource};
