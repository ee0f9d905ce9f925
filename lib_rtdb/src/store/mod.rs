//! # Data Store
//!
//! The hierarchical value tree behind the protocol. Sessions only talk to the
//! [`Store`] trait, so the in-memory implementation can be swapped for another
//! backend without touching dispatch.
//!
//! Values handed to subscription listeners and returned by
//! [`Store::export_value`] are in export form (priorities inline, see
//! [`tree`]). [`Store::read`] returns plain values.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::data::query::Query;
use crate::error::StoreError;

/// In-memory store with change notification.
pub mod memory;
/// Child ordering and query views.
pub mod ordering;
/// Pure export-form tree operations.
pub mod tree;

pub use memory::MemoryStore;

pub type SubscriptionId = u64;

/// Called with the export value of a subscribed view, once on subscribe and
/// again whenever that view changes. Must not block.
pub type ValueListener = Arc<dyn Fn(Value) + Send + Sync>;

/// Decides, given the current export value, whether a conditional set applies.
pub type SetGuard = Box<dyn FnOnce(&Value) -> bool + Send>;

/// Result of [`Store::set_if`].
#[derive(Debug, Clone, PartialEq)]
pub enum SetOutcome {
    Applied,
    /// The guard refused; carries the export value it was shown.
    Rejected { current: Value },
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Plain value at `path`, `null` when absent.
    async fn read(&self, path: &str) -> Result<Value, StoreError>;

    /// Value at `path` with priorities inline.
    async fn export_value(&self, path: &str) -> Result<Value, StoreError>;

    /// Overwrites `path`. Writing `null` removes it.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Overwrites `path` only if `guard` accepts the current export value.
    /// The check and the write happen atomically.
    async fn set_if(&self, path: &str, value: Value, guard: SetGuard) -> Result<SetOutcome, StoreError>;

    /// Writes each child of `partial` below `path`. Keys may contain slashes.
    async fn update(&self, path: &str, partial: Map<String, Value>) -> Result<(), StoreError>;

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.set(path, Value::Null).await
    }

    async fn subscribe(
        &self,
        path: &str,
        query: &Query,
        listener: ValueListener,
    ) -> Result<SubscriptionId, StoreError>;

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), StoreError>;
}
