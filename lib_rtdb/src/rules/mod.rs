//! # Rule Gates
//!
//! Every read and write passes a [`RuleGate`] before it reaches the store. A
//! denial is an ordinary outcome reported as a [`RuleDecision`]; a
//! [`RuleError`] means the rules themselves could not be evaluated.
//!
//! The gate can be swapped while the server runs through [`SwappableRules`].

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::AuthClaims;
use crate::error::RuleError;

/// Boolean read/write rules with wildcard segments.
pub mod path_rules;

pub use path_rules::PathRules;

/// The outcome of one rule check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDecision {
    pub allowed: bool,
    /// Why access was granted or refused, for logs.
    pub info: String,
}

impl RuleDecision {
    pub fn allow(info: impl Into<String>) -> Self {
        Self {
            allowed: true,
            info: info.into(),
        }
    }

    pub fn deny(info: impl Into<String>) -> Self {
        Self {
            allowed: false,
            info: info.into(),
        }
    }
}

#[async_trait]
pub trait RuleGate: Send + Sync {
    async fn try_read(&self, path: &str, auth: Option<&AuthClaims>) -> Result<RuleDecision, RuleError>;

    /// `new_value` is the full value `path` would hold after the write.
    async fn try_write(
        &self,
        path: &str,
        new_value: &Value,
        auth: Option<&AuthClaims>,
    ) -> Result<RuleDecision, RuleError>;

    /// `merged` is the value `path` would hold after the merge.
    async fn try_patch(
        &self,
        path: &str,
        merged: &Value,
        auth: Option<&AuthClaims>,
    ) -> Result<RuleDecision, RuleError> {
        self.try_write(path, merged, auth).await
    }
}

/// Allows everything. Used when no rules are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenRules;

#[async_trait]
impl RuleGate for OpenRules {
    async fn try_read(&self, _path: &str, _auth: Option<&AuthClaims>) -> Result<RuleDecision, RuleError> {
        Ok(RuleDecision::allow("no rules configured"))
    }

    async fn try_write(
        &self,
        _path: &str,
        _new_value: &Value,
        _auth: Option<&AuthClaims>,
    ) -> Result<RuleDecision, RuleError> {
        Ok(RuleDecision::allow("no rules configured"))
    }
}

/// A gate whose implementation can be replaced at runtime.
pub struct SwappableRules {
    inner: RwLock<Arc<dyn RuleGate>>,
}

impl SwappableRules {
    pub fn new(gate: Arc<dyn RuleGate>) -> Self {
        Self {
            inner: RwLock::new(gate),
        }
    }

    pub fn replace(&self, gate: Arc<dyn RuleGate>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = gate;
    }

    fn current(&self) -> Arc<dyn RuleGate> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for SwappableRules {
    fn default() -> Self {
        Self::new(Arc::new(OpenRules))
    }
}

#[async_trait]
impl RuleGate for SwappableRules {
    async fn try_read(&self, path: &str, auth: Option<&AuthClaims>) -> Result<RuleDecision, RuleError> {
        let gate = self.current();
        gate.try_read(path, auth).await
    }

    async fn try_write(
        &self,
        path: &str,
        new_value: &Value,
        auth: Option<&AuthClaims>,
    ) -> Result<RuleDecision, RuleError> {
        let gate = self.current();
        gate.try_write(path, new_value, auth).await
    }

    async fn try_patch(
        &self,
        path: &str,
        merged: &Value,
        auth: Option<&AuthClaims>,
    ) -> Result<RuleDecision, RuleError> {
        let gate = self.current();
        gate.try_patch(path, merged, auth).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_open_rules_allow_everything() {
        let gate = OpenRules;
        assert!(gate.try_read("a", None).await.unwrap().allowed);
        assert!(gate.try_write("a", &json!(1), None).await.unwrap().allowed);
        assert!(gate.try_patch("a", &json!({"b": 1}), None).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_swap_takes_effect() {
        let gate = SwappableRules::default();
        assert!(gate.try_read("a", None).await.unwrap().allowed);

        let closed = PathRules::from_json(&json!({"rules": {".read": false, ".write": false}})).unwrap();
        gate.replace(Arc::new(closed));
        assert!(!gate.try_read("a", None).await.unwrap().allowed);
    }
}
