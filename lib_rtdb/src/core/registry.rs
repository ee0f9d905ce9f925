//! # Listener Registry
//!
//! Tracks the store subscriptions a session holds, keyed by path and query.
//! A listen claims its key as soon as it is dispatched, before any rule check
//! or subscribe has run, so an unlisten that follows it always finds the
//! entry. Each entry owns a `CancellationToken` that stops the task serving
//! it; the store subscription is attached once it exists.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::data::query::Query;
use crate::store::SubscriptionId;

/// Identifies one listen on a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenKey {
    pub path: String,
    pub query: String,
}

impl ListenKey {
    pub fn new(path: &str, query: &Query) -> Self {
        Self {
            path: path.to_string(),
            query: query.identity(),
        }
    }
}

/// A claimed listen. `subscription` stays `None` until the store accepted it.
#[derive(Debug)]
pub struct ActiveListener {
    pub ticket: u64,
    pub subscription: Option<SubscriptionId>,
    pub cancel: CancellationToken,
}

/// Handle the listen task keeps for the entry it claimed.
#[derive(Debug, Clone)]
pub struct ListenTicket {
    pub id: u64,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<ListenKey, ActiveListener>>,
    next_ticket: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key` for a new listen. The entry it displaced, if any, is
    /// cancelled and returned so its subscription can be released.
    pub fn reserve(&self, key: ListenKey) -> (ListenTicket, Option<ActiveListener>) {
        let ticket = ListenTicket {
            id: self.next_ticket.fetch_add(1, Ordering::Relaxed),
            cancel: CancellationToken::new(),
        };
        let entry = ActiveListener {
            ticket: ticket.id,
            subscription: None,
            cancel: ticket.cancel.clone(),
        };
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let displaced = listeners.insert(key, entry);
        if let Some(previous) = &displaced {
            previous.cancel.cancel();
        }
        (ticket, displaced)
    }

    /// Records the store subscription for a claimed entry. Returns `false`
    /// when the claim was withdrawn in the meantime; the caller then owns
    /// `subscription` and must release it.
    pub fn attach(&self, key: &ListenKey, ticket: &ListenTicket, subscription: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        match listeners.get_mut(key) {
            Some(entry) if entry.ticket == ticket.id && !entry.cancel.is_cancelled() => {
                entry.subscription = Some(subscription);
                true
            }
            _ => false,
        }
    }

    /// Removes the listener under `key`, cancelling its task.
    pub fn remove(&self, key: &ListenKey) -> Option<ActiveListener> {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = listeners.remove(key);
        if let Some(listener) = &removed {
            listener.cancel.cancel();
        }
        removed
    }

    /// Removes the listener under `key` only if it is still the one `ticket`
    /// claimed.
    pub fn remove_if(&self, key: &ListenKey, ticket: &ListenTicket) -> Option<ActiveListener> {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if listeners.get(key).map(|l| l.ticket) != Some(ticket.id) {
            return None;
        }
        let removed = listeners.remove(key);
        if let Some(listener) = &removed {
            listener.cancel.cancel();
        }
        removed
    }

    /// Removes every listener, cancelling all tasks.
    pub fn drain(&self) -> Vec<ActiveListener> {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners
            .drain()
            .map(|(_, listener)| {
                listener.cancel.cancel();
                listener
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> ListenKey {
        ListenKey::new(path, &Query::default())
    }

    #[test]
    fn test_reserve_displaces_same_key() {
        let registry = ListenerRegistry::new();
        let (first, none) = registry.reserve(key("a"));
        assert!(none.is_none());
        assert!(registry.attach(&key("a"), &first, 1));

        let (second, displaced) = registry.reserve(key("a"));
        let displaced = displaced.unwrap();
        assert_eq!(displaced.subscription, Some(1));
        assert!(first.cancel.is_cancelled());
        assert!(!second.cancel.is_cancelled());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_query_is_part_of_the_key() {
        let registry = ListenerRegistry::new();
        registry.reserve(key("a"));
        registry.reserve(ListenKey::new("a", &Query::default().limit_to_first(1)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_attach_after_remove_is_refused() {
        let registry = ListenerRegistry::new();
        let (ticket, _) = registry.reserve(key("a"));

        let removed = registry.remove(&key("a")).unwrap();
        assert_eq!(removed.subscription, None);
        assert!(ticket.cancel.is_cancelled());
        assert!(!registry.attach(&key("a"), &ticket, 5));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_attach_to_displaced_claim_is_refused() {
        let registry = ListenerRegistry::new();
        let (old, _) = registry.reserve(key("a"));
        let (new, _) = registry.reserve(key("a"));
        assert!(!registry.attach(&key("a"), &old, 1));
        assert!(registry.attach(&key("a"), &new, 2));
    }

    #[test]
    fn test_remove_if_checks_ticket() {
        let registry = ListenerRegistry::new();
        let (old, _) = registry.reserve(key("a"));
        let (new, _) = registry.reserve(key("a"));

        assert!(registry.remove_if(&key("a"), &old).is_none());
        assert!(!new.cancel.is_cancelled());
        assert!(registry.remove_if(&key("a"), &new).is_some());
        assert!(new.cancel.is_cancelled());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drain_cancels_everything() {
        let registry = ListenerRegistry::new();
        let tickets: Vec<_> = (0..3)
            .map(|i| registry.reserve(key(&format!("p{i}"))).0)
            .collect();
        assert_eq!(registry.drain().len(), 3);
        assert!(tickets.iter().all(|t| t.cancel.is_cancelled()));
        assert!(registry.is_empty());
    }
}
