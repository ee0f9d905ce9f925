//! Path-based boolean rules.
//!
//! Accepts the usual rules document shape:
//!
//! ```json
//! {"rules": {".read": true, "users": {"$uid": {".write": true}}}}
//! ```
//!
//! A grant at any ancestor cascades to everything below it. A `$name` key
//! matches any single segment when no literal sibling matches. Only literal
//! `true`/`false` rules are evaluated; expressions are rejected when the
//! document is loaded. Admin sessions bypass the rules entirely.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::AuthClaims;
use crate::error::RuleError;
use crate::rules::{RuleDecision, RuleGate};
use crate::store::tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

impl Access {
    fn key(&self) -> &'static str {
        match self {
            Access::Read => ".read",
            Access::Write => ".write",
        }
    }
}

#[derive(Debug, Default)]
struct RuleNode {
    read: Option<bool>,
    write: Option<bool>,
    children: BTreeMap<String, RuleNode>,
    wildcard: Option<Box<RuleNode>>,
}

impl RuleNode {
    fn parse(doc: &Value, location: &str) -> Result<Self, RuleError> {
        let Value::Object(map) = doc else {
            return Err(RuleError::InvalidDocument(format!(
                "rules at '{location}' must be an object"
            )));
        };

        let mut node = RuleNode::default();
        for (key, value) in map {
            let here = format!("{location}/{key}");
            match key.as_str() {
                ".read" => node.read = Some(literal(value, &here)?),
                ".write" => node.write = Some(literal(value, &here)?),
                k if k.starts_with('.') => {
                    log::debug!("Ignoring rule key '{here}'");
                }
                k if k.starts_with('$') => {
                    node.wildcard = Some(Box::new(RuleNode::parse(value, &here)?));
                }
                k => {
                    node.children.insert(k.to_string(), RuleNode::parse(value, &here)?);
                }
            }
        }
        Ok(node)
    }

    fn rule(&self, access: Access) -> Option<bool> {
        match access {
            Access::Read => self.read,
            Access::Write => self.write,
        }
    }

    fn child(&self, segment: &str) -> Option<&RuleNode> {
        self.children
            .get(segment)
            .or_else(|| self.wildcard.as_deref())
    }
}

fn literal(value: &Value, location: &str) -> Result<bool, RuleError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.trim() == "true" => Ok(true),
        Value::String(s) if s.trim() == "false" => Ok(false),
        other => Err(RuleError::UnsupportedExpression {
            path: location.to_string(),
            expression: other.to_string(),
        }),
    }
}

/// Boolean rules keyed by path.
#[derive(Debug)]
pub struct PathRules {
    root: RuleNode,
}

impl PathRules {
    /// Loads a rules document, with or without the outer `rules` key.
    pub fn from_json(doc: &Value) -> Result<Self, RuleError> {
        let rules = doc.get("rules").unwrap_or(doc);
        Ok(Self {
            root: RuleNode::parse(rules, "")?,
        })
    }

    fn check(&self, path: &str, access: Access, auth: Option<&AuthClaims>) -> RuleDecision {
        if auth.is_some_and(|a| a.admin) {
            return RuleDecision::allow("admin access");
        }

        let mut node = Some(&self.root);
        let mut location = String::new();
        let mut segments = tree::segments(path).into_iter();
        while let Some(current) = node {
            if current.rule(access) == Some(true) {
                return RuleDecision::allow(format!("{} granted at '/{location}'", access.key()));
            }
            let Some(segment) = segments.next() else {
                break;
            };
            if !location.is_empty() {
                location.push('/');
            }
            location.push_str(segment);
            node = current.child(segment);
        }
        RuleDecision::deny(format!("no {} rule grants access to '/{path}'", access.key()))
    }
}

#[async_trait]
impl RuleGate for PathRules {
    async fn try_read(&self, path: &str, auth: Option<&AuthClaims>) -> Result<RuleDecision, RuleError> {
        Ok(self.check(path, Access::Read, auth))
    }

    async fn try_write(
        &self,
        path: &str,
        _new_value: &Value,
        auth: Option<&AuthClaims>,
    ) -> Result<RuleDecision, RuleError> {
        Ok(self.check(path, Access::Write, auth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules(doc: Value) -> PathRules {
        PathRules::from_json(&doc).unwrap()
    }

    #[test]
    fn test_grant_cascades_down() {
        let r = rules(json!({"rules": {"public": {".read": true}}}));
        assert!(r.check("public", Access::Read, None).allowed);
        assert!(r.check("public/a/b", Access::Read, None).allowed);
        assert!(!r.check("private", Access::Read, None).allowed);
        assert!(!r.check("public", Access::Write, None).allowed);
    }

    #[test]
    fn test_false_below_a_grant_does_not_revoke() {
        let r = rules(json!({".write": true, "locked": {".write": false}}));
        assert!(r.check("locked", Access::Write, None).allowed);
    }

    #[test]
    fn test_wildcard_segments() {
        let r = rules(json!({"users": {"$uid": {".write": true}, "root": {".write": false}}}));
        assert!(r.check("users/ada", Access::Write, None).allowed);
        assert!(r.check("users/ada/name", Access::Write, None).allowed);
        assert!(!r.check("users/root", Access::Write, None).allowed);
        assert!(!r.check("users", Access::Write, None).allowed);
    }

    #[test]
    fn test_admin_bypasses_rules() {
        let r = rules(json!({".read": false}));
        assert!(r.check("x", Access::Read, Some(&AuthClaims::admin())).allowed);
    }

    #[test]
    fn test_string_literals_and_expressions() {
        let r = rules(json!({".read": "true"}));
        assert!(r.check("", Access::Read, None).allowed);

        let err = PathRules::from_json(&json!({"a": {".read": "auth != null"}})).unwrap_err();
        assert_eq!(
            err,
            RuleError::UnsupportedExpression {
                path: "/a/.read".into(),
                expression: "\"auth != null\"".into()
            }
        );
    }

    #[test]
    fn test_non_object_rules_are_invalid() {
        assert!(matches!(
            PathRules::from_json(&json!({"rules": 5})),
            Err(RuleError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_other_dot_keys_are_ignored() {
        let r = rules(json!({"a": {".indexOn": ["x"], ".validate": "newData.exists()", ".read": true}}));
        assert!(r.check("a", Access::Read, None).allowed);
    }
}
