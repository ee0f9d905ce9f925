//! # Wire Protocol
//!
//! Everything between raw WebSocket text and a typed request: fragment
//! reassembly, path normalization, message decoding and the outbound frame
//! builders.

/// Inbound reassembly and outbound chunking.
pub mod frame;
/// Outbound frame builders and status codes.
pub mod envelope;
/// Data-frame decoding into typed requests.
pub mod message;
/// Request path normalization.
pub mod path;

pub use envelope::Status;
pub use frame::{chunk_payload, FrameAssembler};
pub use message::{decode, Action, Inbound, Message};
pub use path::{normalize_path, NormalizedPath};
