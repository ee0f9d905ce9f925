//! # Session
//!
//! One `Session` per client connection. It owns the inbound frame buffer,
//! decodes requests and hands them to the dispatcher. Everything a handler
//! needs lives in [`SessionShared`], which spawned handler tasks keep alive
//! through an `Arc`.
//!
//! ## Lifecycle
//!
//! `Connected` → `Active` once the handshake is sent → `Closed` when the
//! transport goes away. A closed session sends nothing and releases every
//! store subscription it registered.
//!
//! Handlers take their auth snapshot and resolve timestamps synchronously
//! before spawning, so requests start in the order they arrived.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::auth::{AuthClaims, TokenValidator};
use crate::configs::ServerOptions;
use crate::core::dispatcher;
use crate::core::memory_guard::BufferGuard;
use crate::core::registry::ListenerRegistry;
use crate::error::FrameError;
use crate::protocol::envelope::{self, Status};
use crate::protocol::frame::{chunk_payload, FrameAssembler, KEEPALIVE_FRAME};
use crate::protocol::message::{self, Inbound};
use crate::rules::RuleGate;
use crate::store::{Store, SubscriptionId};
use crate::utils::clock::Clock;

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Active,
    Closed,
}

/// Credential a session presented most recently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    /// A token re-validated on every use.
    Token(String),
    /// Authenticated with the server secret.
    Admin,
}

/// The collaborators every session works against.
#[derive(Clone)]
pub struct SessionContext {
    pub store: Arc<dyn Store>,
    pub rules: Arc<dyn RuleGate>,
    pub tokens: Arc<TokenValidator>,
    pub clock: Clock,
    pub options: Arc<ServerOptions>,
}

/// Session state reachable from spawned handler tasks.
pub(crate) struct SessionShared {
    pub(crate) id: SessionId,
    pub(crate) ctx: SessionContext,
    pub(crate) listeners: ListenerRegistry,
    /// Held while one message's frames are queued so chunks never interleave.
    outbound: Mutex<mpsc::UnboundedSender<String>>,
    auth: Mutex<AuthState>,
    state: Mutex<SessionState>,
    active_sessions: Arc<AtomicUsize>,
}

impl SessionShared {
    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `next`, returning the previous state.
    fn transition(&self, next: SessionState) -> SessionState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *state, next);
        if next == SessionState::Closed && previous != SessionState::Closed {
            self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        }
        previous
    }

    /// Serializes `message` and queues it as a count frame plus chunks.
    pub(crate) fn send(&self, message: &Value) {
        if self.state() == SessionState::Closed {
            log::debug!("[session {}] Not sending on closed session", self.id);
            return;
        }
        let payload = message.to_string();
        log::debug!("[session {}] >> {}", self.id, payload);
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        for frame in chunk_payload(&payload, self.ctx.options.max_frame_length) {
            if outbound.send(frame).is_err() {
                log::debug!("[session {}] Transport writer is gone", self.id);
                return;
            }
        }
    }

    pub(crate) fn ack(&self, request_id: Option<u64>, data: Value) {
        self.send(&envelope::ack(request_id, data));
    }

    pub(crate) fn reject(&self, request_id: Option<u64>, status: Status) {
        self.send(&envelope::status(request_id, status));
    }

    pub(crate) fn push(&self, path: &str, data: Value) {
        self.send(&envelope::push(path, data));
    }

    pub(crate) fn set_auth(&self, auth: AuthState) {
        *self.auth.lock().unwrap_or_else(PoisonError::into_inner) = auth;
    }

    /// The auth context for the next request. A stored token that no longer
    /// validates is cleared.
    pub(crate) fn auth_claims(&self) -> Option<AuthClaims> {
        let current = self
            .auth
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match current {
            AuthState::Anonymous => None,
            AuthState::Admin => Some(AuthClaims::admin()),
            AuthState::Token(token) => match self.ctx.tokens.decode(&token) {
                Ok(claims) => Some(AuthClaims::from_token(&claims)),
                Err(e) => {
                    log::info!("[session {}] Dropping stored token: {e}", self.id);
                    let mut auth = self.auth.lock().unwrap_or_else(PoisonError::into_inner);
                    if *auth == AuthState::Token(token) {
                        *auth = AuthState::Anonymous;
                    }
                    None
                }
            },
        }
    }

    /// Cancels a store subscription, logging failures.
    pub(crate) async fn release(&self, subscription: SubscriptionId) {
        if let Err(e) = self.ctx.store.unsubscribe(subscription).await {
            log::error!(
                "[session {}] Failed to release subscription {subscription}: {e}",
                self.id
            );
        }
    }
}

/// A client connection as seen by the protocol engine.
pub struct Session {
    shared: Arc<SessionShared>,
    assembler: FrameAssembler,
}

impl Session {
    /// Opens a session and sends the handshake.
    pub(crate) fn open(
        id: SessionId,
        ctx: SessionContext,
        outbound: mpsc::UnboundedSender<String>,
        guard: Arc<BufferGuard>,
        active_sessions: Arc<AtomicUsize>,
    ) -> Self {
        let assembler = FrameAssembler::new(ctx.options.max_buffered_bytes).with_guard(guard);
        active_sessions.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(SessionShared {
            id,
            ctx,
            listeners: ListenerRegistry::new(),
            outbound: Mutex::new(outbound),
            auth: Mutex::new(AuthState::Anonymous),
            state: Mutex::new(SessionState::Connected),
            active_sessions,
        });

        let handshake = envelope::handshake(shared.ctx.clock.now(), &shared.ctx.options.name);
        shared.send(&handshake);
        shared.transition(SessionState::Active);
        log::info!("[session {id}] Opened");

        Self { shared, assembler }
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn auth_state(&self) -> AuthState {
        self.shared
            .auth
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of listeners currently registered.
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.len()
    }

    /// Feeds one inbound text frame.
    ///
    /// An error means the inbound buffer overflowed; the caller should drop
    /// the connection.
    pub fn receive(&mut self, frame: &str) -> Result<(), FrameError> {
        if self.state() == SessionState::Closed {
            return Ok(());
        }
        // A "0" in the middle of a split message is payload, not a keepalive.
        if frame == KEEPALIVE_FRAME && self.assembler.buffered_len() == 0 {
            log::trace!("[session {}] keepalive", self.id());
            return Ok(());
        }
        log::trace!("[session {}] << {}", self.id(), frame);
        if let Some(document) = self.assembler.push(frame)? {
            self.handle(document);
        }
        Ok(())
    }

    /// Decodes a complete document and dispatches it.
    pub fn handle(&self, document: Value) {
        match message::decode(document) {
            Ok(Inbound::Request(message)) => dispatcher::dispatch(&self.shared, message),
            Ok(Inbound::UnknownAction { code, request_id }) => {
                log::warn!(
                    "[session {}] Ignoring unknown action '{code}' (request {request_id:?})",
                    self.id()
                );
            }
            Ok(Inbound::Ignored) => {}
            Err(e) => log::warn!("[session {}] Dropping malformed frame: {e}", self.id()),
        }
    }

    /// Closes the session and releases its subscriptions.
    pub async fn close(&self) {
        if self.shared.transition(SessionState::Closed) == SessionState::Closed {
            return;
        }
        let listeners = self.shared.listeners.drain();
        for subscription in listeners.iter().filter_map(|l| l.subscription) {
            self.shared.release(subscription).await;
        }
        log::info!(
            "[session {}] Closed, released {} listener(s)",
            self.id(),
            listeners.len()
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.shared.transition(SessionState::Closed) == SessionState::Closed {
            return;
        }
        let listeners = self.shared.listeners.drain();
        if listeners.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let shared = self.shared.clone();
                handle.spawn(async move {
                    for subscription in listeners.iter().filter_map(|l| l.subscription) {
                        shared.release(subscription).await;
                    }
                });
            }
            Err(_) => log::warn!(
                "[session {}] Dropped outside a runtime; {} subscription(s) not released",
                self.shared.id,
                listeners.len()
            ),
        }
    }
}
