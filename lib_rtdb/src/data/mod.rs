//! Value-level helpers: the transaction hash, timestamp substitution and
//! query translation.

/// Canonical content hash for compare-and-swap writes.
pub mod hash;
/// Query directive translation.
pub mod query;
/// Server-timestamp sentinel substitution.
pub mod timestamp;

pub use hash::content_hash;
pub use query::{translate, Bound, Limit, OrderBy, Query};
pub use timestamp::{is_server_timestamp, resolve, server_timestamp};
