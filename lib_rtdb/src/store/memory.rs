//! # In-Memory Store
//!
//! Keeps the whole tree as one export-form [`Value`] behind a mutex. Every
//! mutation recomputes the view of each subscription and notifies those whose
//! view changed. Listeners are invoked after the lock is released, so a
//! listener may call back into the store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::data::query::Query;
use crate::error::StoreError;
use crate::store::ordering::apply_query;
use crate::store::tree;
use crate::store::{SetGuard, SetOutcome, Store, SubscriptionId, ValueListener};

struct Subscription {
    path: String,
    query: Query,
    listener: ValueListener,
    last: Value,
}

struct Inner {
    root: Value,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    next_id: SubscriptionId,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

type Notification = (ValueListener, Value);

impl MemoryStore {
    /// A store seeded with `initial`, which may use export form.
    pub fn new(initial: Value) -> Self {
        Self {
            inner: Mutex::new(Inner {
                root: tree::canonicalize(initial),
                subscriptions: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(notifications: Vec<Notification>) {
        for (listener, value) in notifications {
            listener(value);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}

impl Inner {
    fn export(&self, path: &str) -> Value {
        tree::get(&self.root, &tree::segments(path))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn view(&self, path: &str, query: &Query) -> Value {
        let node = tree::get(&self.root, &tree::segments(path)).unwrap_or(&Value::Null);
        apply_query(node, query)
    }

    fn write(&mut self, path: &str, value: Value) {
        tree::set_at(&mut self.root, &tree::segments(path), tree::canonicalize(value));
    }

    /// Refreshes every subscription and returns those whose view changed.
    fn collect_changes(&mut self) -> Vec<Notification> {
        let mut changed = Vec::new();
        let root = &self.root;
        for sub in self.subscriptions.values_mut() {
            let node = tree::get(root, &tree::segments(&sub.path)).unwrap_or(&Value::Null);
            let view = apply_query(node, &sub.query);
            if view != sub.last {
                sub.last = view.clone();
                changed.push((sub.listener.clone(), view));
            }
        }
        changed
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read(&self, path: &str) -> Result<Value, StoreError> {
        Ok(tree::strip_priorities(&self.lock().export(path)))
    }

    async fn export_value(&self, path: &str) -> Result<Value, StoreError> {
        Ok(self.lock().export(path))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let changes = {
            let mut inner = self.lock();
            inner.write(path, value);
            inner.collect_changes()
        };
        Self::notify(changes);
        Ok(())
    }

    async fn set_if(&self, path: &str, value: Value, guard: SetGuard) -> Result<SetOutcome, StoreError> {
        let (outcome, changes) = {
            let mut inner = self.lock();
            let current = inner.export(path);
            if guard(&current) {
                inner.write(path, value);
                (SetOutcome::Applied, inner.collect_changes())
            } else {
                (SetOutcome::Rejected { current }, Vec::new())
            }
        };
        Self::notify(changes);
        Ok(outcome)
    }

    async fn update(&self, path: &str, partial: Map<String, Value>) -> Result<(), StoreError> {
        let changes = {
            let mut inner = self.lock();
            for (key, value) in partial {
                let child = format!("{}/{}", path.trim_end_matches('/'), key);
                inner.write(&child, value);
            }
            inner.collect_changes()
        };
        Self::notify(changes);
        Ok(())
    }

    async fn subscribe(
        &self,
        path: &str,
        query: &Query,
        listener: ValueListener,
    ) -> Result<SubscriptionId, StoreError> {
        let (id, initial) = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            let initial = inner.view(path, query);
            inner.subscriptions.insert(
                id,
                Subscription {
                    path: path.to_string(),
                    query: query.clone(),
                    listener: listener.clone(),
                    last: initial.clone(),
                },
            );
            (id, initial)
        };
        log::debug!("Subscription {id} opened on '/{path}'");
        listener(initial);
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), StoreError> {
        if self.lock().subscriptions.remove(&id).is_some() {
            log::debug!("Subscription {id} closed");
        }
        Ok(())
    }
}
