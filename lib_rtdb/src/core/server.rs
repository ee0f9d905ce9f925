//! # Server Control Surface
//!
//! [`RtdbServer`] wires a store, a swappable rule gate, the token validator
//! and a shared clock into a [`ConnectionManager`]. Besides accepting
//! connections it lets embedding code and tests adjust the running server:
//! replace rules, pin the clock, change the auth secret, inspect data.

use std::sync::Arc;

use serde_json::Value;

use crate::auth::TokenValidator;
use crate::configs::ServerOptions;
use crate::core::connection_manager::ConnectionManager;
use crate::core::session::SessionContext;
use crate::error::{RuleError, StoreError};
use crate::rules::{PathRules, RuleGate, SwappableRules};
use crate::store::{MemoryStore, Store};
use crate::utils::clock::{Clock, TimeSource};

pub struct RtdbServer {
    store: Arc<dyn Store>,
    rules: Arc<SwappableRules>,
    tokens: Arc<TokenValidator>,
    clock: Clock,
    connections: ConnectionManager,
}

impl RtdbServer {
    /// A server backed by an in-memory store seeded with `data`.
    pub fn new(options: ServerOptions, data: Value) -> Self {
        Self::with_store(options, Arc::new(MemoryStore::new(data)))
    }

    /// A server backed by `store`. Rules start open.
    pub fn with_store(options: ServerOptions, store: Arc<dyn Store>) -> Self {
        let clock = Clock::new();
        let tokens = Arc::new(TokenValidator::new(options.auth_secret.clone(), clock.clone()));
        let rules = Arc::new(SwappableRules::default());
        let ctx = SessionContext {
            store: store.clone(),
            rules: rules.clone(),
            tokens: tokens.clone(),
            clock: clock.clone(),
            options: Arc::new(options),
        };
        log::info!("Realtime database engine ready as '{}'", ctx.options.name);

        Self {
            store,
            rules,
            tokens,
            clock,
            connections: ConnectionManager::new(ctx),
        }
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Replaces the rule gate for all sessions, including open ones.
    pub fn set_rules(&self, gate: Arc<dyn RuleGate>) {
        self.rules.replace(gate);
    }

    /// Loads a rules document and installs it.
    pub fn set_rules_json(&self, doc: &Value) -> Result<(), RuleError> {
        let rules = PathRules::from_json(doc)?;
        self.set_rules(Arc::new(rules));
        log::info!("Installed new rules");
        Ok(())
    }

    /// Pins, delegates or resets the server clock. Timestamps and token
    /// windows both follow it.
    pub fn set_time(&self, source: impl Into<TimeSource>) {
        self.clock.set_time(source);
    }

    /// Changes the secret used for token signatures and admin access.
    pub fn set_auth_secret(&self, secret: Option<String>) {
        self.tokens.set_secret(secret);
    }

    /// Plain value at `path`.
    pub async fn get_value(&self, path: &str) -> Result<Value, StoreError> {
        self.store.read(path).await
    }

    /// Value at `path` with priorities inline.
    pub async fn export_data(&self, path: &str) -> Result<Value, StoreError> {
        self.store.export_value(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_data_accessors() {
        let server = RtdbServer::new(
            ServerOptions::default(),
            json!({"a": {".priority": 1, ".value": "x"}}),
        );
        assert_eq!(server.get_value("a").await.unwrap(), json!("x"));
        assert_eq!(
            server.export_data("a").await.unwrap(),
            json!({".priority": 1, ".value": "x"})
        );
    }

    #[test]
    fn test_set_time_is_shared() {
        let server = RtdbServer::new(ServerOptions::default(), Value::Null);
        server.set_time(42_i64);
        assert_eq!(server.clock().now(), 42);
        assert_eq!(server.connections().context().clock.now(), 42);
    }

    #[test]
    fn test_set_rules_json_rejects_expressions() {
        let server = RtdbServer::new(ServerOptions::default(), Value::Null);
        assert!(server.set_rules_json(&json!({"rules": {".read": "auth != null"}})).is_err());
        assert!(server.set_rules_json(&json!({"rules": {".read": true}})).is_ok());
    }

    #[test]
    fn test_secret_updates_validator() {
        let server = RtdbServer::new(ServerOptions::default().with_secret(Some("a".into())), Value::Null);
        server.set_auth_secret(Some("b".into()));
        assert_eq!(server.connections().context().tokens.secret().as_deref(), Some("b"));
    }
}
