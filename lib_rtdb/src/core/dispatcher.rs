//! # Action Dispatcher
//!
//! Routes each decoded [`Message`] to its handler. The action set is closed,
//! so routing is a single `match`.
//!
//! | action      | gate              | effect                          | reply                          |
//! |-------------|-------------------|---------------------------------|--------------------------------|
//! | `l` / `q`   | `try_read`        | subscribe                       | push per value, ack after first |
//! | `n`         | none              | unsubscribe                     | ack                            |
//! | `m`         | `try_patch`       | shallow merge                   | ack                            |
//! | `p`         | `try_write`, hash | overwrite                       | ack or `datastale`             |
//! | `auth`      | token check       | store credential                | ack with claims or `invalid_token` |

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::auth::{normalize, AuthClaims, Claims};
use crate::core::registry::{ActiveListener, ListenKey, ListenTicket};
use crate::core::session::{AuthState, SessionShared};
use crate::core::write_pipeline::{self, PendingWrite};
use crate::data::query::{translate, Query};
use crate::protocol::envelope::{self, Status};
use crate::protocol::message::{Action, Message};
use crate::store::{SubscriptionId, ValueListener};

pub(crate) fn dispatch(session: &Arc<SessionShared>, message: Message) {
    log::debug!(
        "[session {}] {} '{}' (request {:?})",
        session.id,
        message.action().code(),
        message.full_path(),
        message.request_id()
    );

    match message.action() {
        Action::Listen | Action::Query => {
            let auth = session.auth_claims();
            let key = ListenKey::new(message.path(), &listen_query(&message));
            let (ticket, displaced) = session.listeners.reserve(key.clone());
            let claim = ListenClaim { key, ticket };
            tokio::spawn(handle_listen(session.clone(), message, auth, claim, displaced));
        }
        Action::Unlisten => {
            let key = ListenKey::new(message.path(), &listen_query(&message));
            let removed = session.listeners.remove(&key);
            tokio::spawn(handle_unlisten(session.clone(), message, removed));
        }
        Action::Merge => {
            let write = PendingWrite::prepare(session, &message);
            tokio::spawn(write_pipeline::run_merge(session.clone(), write));
        }
        Action::Set => {
            let write = PendingWrite::prepare(session, &message);
            tokio::spawn(write_pipeline::run_set(session.clone(), write));
        }
        Action::Auth | Action::GAuth => handle_auth(session, &message),
    }
}

fn listen_query(message: &Message) -> Query {
    message
        .query()
        .map(|directives| translate(Query::default(), directives))
        .unwrap_or_default()
}

/// The registry entry a listen claimed when it was dispatched.
struct ListenClaim {
    key: ListenKey,
    ticket: ListenTicket,
}

impl ListenClaim {
    fn withdrawn(&self) -> bool {
        self.ticket.cancel.is_cancelled()
    }

    /// Gives the key back if nothing else took it over.
    fn withdraw(&self, session: &SessionShared) {
        session.listeners.remove_if(&self.key, &self.ticket);
    }
}

async fn handle_listen(
    session: Arc<SessionShared>,
    message: Message,
    auth: Option<AuthClaims>,
    claim: ListenClaim,
    displaced: Option<ActiveListener>,
) {
    if let Some(subscription) = displaced.and_then(|previous| previous.subscription) {
        session.release(subscription).await;
    }

    let path = message.path().to_string();
    let request_id = message.request_id();
    let query = listen_query(&message);

    let decision = session.ctx.rules.try_read(&path, auth.as_ref()).await;
    if claim.withdrawn() {
        log::debug!("[session {}] Listen on '/{path}' withdrawn before it started", session.id);
        return;
    }
    match decision {
        Ok(decision) if decision.allowed => {}
        Ok(decision) => {
            log::info!(
                "[session {}] Read denied on '/{path}': {}",
                session.id,
                decision.info
            );
            claim.withdraw(&session);
            session.reject(request_id, Status::PermissionDenied);
            return;
        }
        Err(e) => {
            log::error!("[session {}] Rule evaluation failed for '/{path}': {e}", session.id);
            claim.withdraw(&session);
            return;
        }
    }

    let (tx, rx) = mpsc::unbounded_channel::<Value>();
    let listener: ValueListener = Arc::new(move |value| {
        let _ = tx.send(value);
    });
    let subscription = match session.ctx.store.subscribe(&path, &query, listener).await {
        Ok(id) => id,
        Err(e) => {
            log::error!("[session {}] Subscribe failed on '/{path}': {e}", session.id);
            claim.withdraw(&session);
            return;
        }
    };

    // Unlisten, a newer listen on the same key or session close may have
    // taken the claim while subscribing.
    if !session.listeners.attach(&claim.key, &claim.ticket, subscription) {
        log::debug!("[session {}] Listen on '/{path}' withdrawn while subscribing", session.id);
        session.release(subscription).await;
        return;
    }

    let drain = ListenDrain {
        session,
        path,
        claim,
        subscription,
        request_id,
    };
    drain.run(rx).await;
}

/// Forwards one subscription's values to the client.
struct ListenDrain {
    session: Arc<SessionShared>,
    path: String,
    claim: ListenClaim,
    subscription: SubscriptionId,
    request_id: Option<u64>,
}

impl ListenDrain {
    async fn run(self, mut values: mpsc::UnboundedReceiver<Value>) {
        let cancel = self.claim.ticket.cancel.clone();
        let mut acknowledged = false;
        loop {
            let value = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                value = values.recv() => match value {
                    Some(value) => value,
                    None => break,
                },
            };

            if acknowledged && !self.still_readable().await {
                self.revoke().await;
                break;
            }

            self.session.push(&self.path, value);
            if !acknowledged {
                acknowledged = true;
                self.session.ack(self.request_id, json!({}));
            }
        }
        log::debug!(
            "[session {}] Listener on '/{}' stopped",
            self.session.id,
            self.path
        );
    }

    /// Re-checks read access under the session's current auth. A rule
    /// failure keeps the listener but is logged.
    async fn still_readable(&self) -> bool {
        let auth = self.session.auth_claims();
        match self.session.ctx.rules.try_read(&self.path, auth.as_ref()).await {
            Ok(decision) => {
                if !decision.allowed {
                    log::info!(
                        "[session {}] Read no longer allowed on '/{}': {}",
                        self.session.id,
                        self.path,
                        decision.info
                    );
                }
                decision.allowed
            }
            Err(e) => {
                log::error!(
                    "[session {}] Rule evaluation failed for '/{}': {e}",
                    self.session.id,
                    self.path
                );
                true
            }
        }
    }

    async fn revoke(&self) {
        if self
            .session
            .listeners
            .remove_if(&self.claim.key, &self.claim.ticket)
            .is_some()
        {
            self.session.release(self.subscription).await;
        }
        self.session
            .send(&envelope::listen_revoked(&self.path, Status::PermissionDenied));
    }
}

async fn handle_unlisten(session: Arc<SessionShared>, message: Message, removed: Option<ActiveListener>) {
    match removed {
        Some(listener) => {
            if let Some(subscription) = listener.subscription {
                session.release(subscription).await;
            }
        }
        None => log::debug!(
            "[session {}] No listener on '/{}' to remove",
            session.id,
            message.path()
        ),
    }
    session.ack(message.request_id(), json!({}));
}

fn handle_auth(session: &SessionShared, message: &Message) {
    let request_id = message.request_id();
    let credential = message.credential().unwrap_or_default();

    if session.ctx.tokens.secret().as_deref() == Some(credential) {
        log::info!("[session {}] Authenticated with server secret", session.id);
        session.set_auth(AuthState::Admin);
        let mut admin = Claims::new();
        admin.insert("auth".into(), Value::Null);
        admin.insert("admin".into(), Value::Bool(true));
        admin.insert("exp".into(), Value::Null);
        session.ack(request_id, Value::Object(normalize(&admin)));
        return;
    }

    match session.ctx.tokens.decode(credential) {
        Ok(claims) => {
            log::info!("[session {}] Authenticated with token", session.id);
            session.set_auth(AuthState::Token(credential.to_string()));
            session.ack(request_id, Value::Object(normalize(&claims)));
        }
        Err(e) => {
            log::info!("[session {}] Rejected credential: {e}", session.id);
            session.set_auth(AuthState::Anonymous);
            session.reject(request_id, Status::InvalidToken);
        }
    }
}
