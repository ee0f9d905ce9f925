//! # Write Pipeline
//!
//! Sets and merges run as a fixed sequence of stages. Each stage either
//! returns the input for the next one or halts the request with a [`Halt`]
//! that maps to exactly one reply.
//!
//! Set:   prepare → fold priority → authorize → commit (hash-checked when `h` is given)
//! Merge: prepare → build merged view → authorize → apply
//!
//! `prepare` runs synchronously in the dispatcher; the remaining stages run
//! on a spawned task.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::auth::AuthClaims;
use crate::core::session::SessionShared;
use crate::data::hash::content_hash;
use crate::data::timestamp;
use crate::error::{RtdbError, RuleError, StoreError};
use crate::protocol::envelope::Status;
use crate::protocol::message::Message;
use crate::rules::RuleDecision;
use crate::store::tree::{self, PRIORITY_KEY, VALUE_KEY};
use crate::store::SetOutcome;

/// A write request after timestamp resolution, with the auth it runs under.
#[derive(Debug, Clone)]
pub(crate) struct PendingWrite {
    pub(crate) request_id: Option<u64>,
    pub(crate) path: String,
    pub(crate) value: Value,
    pub(crate) expected_hash: Option<String>,
    pub(crate) is_priority_path: bool,
    pub(crate) auth: Option<AuthClaims>,
}

impl PendingWrite {
    /// Snapshots auth and resolves server timestamps with one clock reading.
    pub(crate) fn prepare(session: &SessionShared, message: &Message) -> Self {
        Self {
            request_id: message.request_id(),
            path: message.path().to_string(),
            value: timestamp::resolve(message.data().clone(), &session.ctx.clock),
            expected_hash: message.hash().map(str::to_string),
            is_priority_path: message.is_priority_path(),
            auth: session.auth_claims(),
        }
    }
}

/// Why a write stopped before it was applied.
#[derive(Debug)]
pub(crate) enum Halt {
    Denied(RuleDecision),
    Stale { current: Value, expected: String },
    Failed(RtdbError),
}

impl From<StoreError> for Halt {
    fn from(e: StoreError) -> Self {
        Halt::Failed(e.into())
    }
}

impl From<RuleError> for Halt {
    fn from(e: RuleError) -> Self {
        Halt::Failed(e.into())
    }
}

type Stage<T> = Result<T, Halt>;

pub(crate) async fn run_set(session: Arc<SessionShared>, write: PendingWrite) {
    let request_id = write.request_id;
    let path = write.path.clone();
    let outcome = execute_set(&session, write).await;
    finish(&session, request_id, &path, outcome);
}

pub(crate) async fn run_merge(session: Arc<SessionShared>, write: PendingWrite) {
    let request_id = write.request_id;
    let path = write.path.clone();
    let outcome = execute_merge(&session, write).await;
    finish(&session, request_id, &path, outcome);
}

async fn execute_set(session: &SessionShared, write: PendingWrite) -> Stage<()> {
    let write = fold_priority(session, write).await?;
    let write = authorize(session, write).await?;
    commit(session, write).await
}

async fn execute_merge(session: &SessionShared, write: PendingWrite) -> Stage<()> {
    let Value::Object(partial) = write.value else {
        return Err(StoreError::InvalidMerge(write.path).into());
    };
    let current = session.ctx.store.export_value(&write.path).await?;
    let merged = merge_shallow(current, &partial);

    let decision = session
        .ctx
        .rules
        .try_patch(&write.path, &merged, write.auth.as_ref())
        .await?;
    if !decision.allowed {
        return Err(Halt::Denied(decision));
    }

    session.ctx.store.update(&write.path, partial).await?;
    Ok(())
}

/// A `.priority` write becomes a write of the parent carrying that priority.
async fn fold_priority(session: &SessionShared, mut write: PendingWrite) -> Stage<PendingWrite> {
    if !write.is_priority_path {
        return Ok(write);
    }
    let current = session.ctx.store.export_value(&write.path).await?;
    write.value = attach_priority(current, write.value);
    Ok(write)
}

async fn authorize(session: &SessionShared, write: PendingWrite) -> Stage<PendingWrite> {
    let decision = session
        .ctx
        .rules
        .try_write(&write.path, &write.value, write.auth.as_ref())
        .await?;
    if decision.allowed {
        Ok(write)
    } else {
        Err(Halt::Denied(decision))
    }
}

async fn commit(session: &SessionShared, write: PendingWrite) -> Stage<()> {
    let store = &session.ctx.store;
    let Some(expected) = write.expected_hash else {
        store.set(&write.path, write.value).await?;
        return Ok(());
    };

    let wanted = expected.clone();
    let guard = Box::new(move |current: &Value| content_hash(current) == wanted);
    match store.set_if(&write.path, write.value, guard).await? {
        SetOutcome::Applied => Ok(()),
        SetOutcome::Rejected { current } => Err(Halt::Stale { current, expected }),
    }
}

fn finish(session: &SessionShared, request_id: Option<u64>, path: &str, outcome: Stage<()>) {
    match outcome {
        Ok(()) => session.ack(request_id, json!({})),
        Err(Halt::Denied(decision)) => {
            log::info!(
                "[session {}] Write denied on '/{path}': {}",
                session.id,
                decision.info
            );
            session.reject(request_id, Status::PermissionDenied);
        }
        Err(Halt::Stale { current, expected }) => {
            log::info!(
                "[session {}] Transaction hash mismatch on '/{path}': expected {expected}, found {}",
                session.id,
                content_hash(&current)
            );
            session.push(path, current);
            session.reject(request_id, Status::DataStale);
        }
        Err(Halt::Failed(e)) => {
            log::error!("[session {}] Write on '/{path}' failed: {e}", session.id);
        }
    }
}

/// Folds `priority` into the export value of the node it belongs to.
pub(crate) fn attach_priority(current: Value, priority: Value) -> Value {
    match current {
        Value::Object(mut map) => {
            map.insert(PRIORITY_KEY.to_string(), priority);
            Value::Object(map)
        }
        other => json!({PRIORITY_KEY: priority, VALUE_KEY: other}),
    }
}

/// `partial` laid over `current` the way the store applies a merge: each key
/// is a relative path, and the location keeps its priority.
pub(crate) fn merge_shallow(current: Value, partial: &Map<String, Value>) -> Value {
    let mut merged = current;
    for (key, value) in partial {
        tree::set_at(&mut merged, &tree::segments(key), tree::canonicalize(value.clone()));
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_priority_to_object() {
        assert_eq!(
            attach_priority(json!({"a": 1}), json!(5)),
            json!({"a": 1, ".priority": 5})
        );
    }

    #[test]
    fn test_attach_priority_wraps_primitives_and_null() {
        assert_eq!(
            attach_priority(json!("x"), json!("p")),
            json!({".priority": "p", ".value": "x"})
        );
        assert_eq!(
            attach_priority(Value::Null, json!(1)),
            json!({".priority": 1, ".value": null})
        );
    }

    #[test]
    fn test_merge_shallow() {
        let partial = json!({"b": 2, "c": {"d": 3}});
        assert_eq!(
            merge_shallow(json!({"a": 1, "b": 1}), partial.as_object().unwrap()),
            json!({"a": 1, "b": 2, "c": {"d": 3}})
        );
        assert_eq!(
            merge_shallow(json!(7), partial.as_object().unwrap()),
            json!({"b": 2, "c": {"d": 3}})
        );
    }

    #[test]
    fn test_merge_shallow_keeps_priority_of_wrapped_value() {
        let partial = json!({"b": 2});
        assert_eq!(
            merge_shallow(json!({".priority": 4, ".value": "x"}), partial.as_object().unwrap()),
            json!({".priority": 4, "b": 2})
        );
    }

    #[test]
    fn test_merge_shallow_lays_out_nested_keys() {
        let partial = json!({"a/b": 2, "c": null});
        assert_eq!(
            merge_shallow(json!({"a": {"x": 1}, "c": 3}), partial.as_object().unwrap()),
            json!({"a": {"x": 1, "b": 2}})
        );
    }
}
