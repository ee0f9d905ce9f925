//! The auth context handed to rule evaluation.

use serde::Serialize;
use serde_json::{json, Value};

use crate::auth::token_validator::Claims;

/// Who a request runs as.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthClaims {
    pub uid: Option<String>,
    pub provider: Option<String>,
    /// Admin sessions bypass rule evaluation.
    pub admin: bool,
    /// The full auth payload, exposed to rules as `auth`.
    pub data: Value,
}

impl AuthClaims {
    /// Builds the auth context from decoded token claims.
    ///
    /// Legacy tokens carry their payload under `d`. Other tokens are exposed
    /// whole, with `uid` taken from `user_id` or `sub` and the provider from
    /// `provider_id`.
    pub fn from_token(claims: &Claims) -> Self {
        let admin = claims.get("admin").and_then(Value::as_bool).unwrap_or(false);

        if let Some(d) = claims.get("d") {
            return Self {
                uid: string_field(d, "uid"),
                provider: string_field(d, "provider"),
                admin,
                data: d.clone(),
            };
        }

        let token = Value::Object(claims.clone());
        let uid = string_field(&token, "user_id").or_else(|| string_field(&token, "sub"));
        let provider = string_field(&token, "provider_id");
        Self {
            data: json!({"provider": provider, "token": token, "uid": uid}),
            uid,
            provider,
            admin,
        }
    }

    /// The context granted to a session that authenticated with the server secret.
    pub fn admin() -> Self {
        Self {
            uid: None,
            provider: None,
            admin: true,
            data: Value::Null,
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(v: Value) -> Claims {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_legacy_payload() {
        let auth = AuthClaims::from_token(&claims(json!({"v": 0, "d": {"uid": "ada", "provider": "password"}, "iat": 1})));
        assert_eq!(auth.uid.as_deref(), Some("ada"));
        assert_eq!(auth.provider.as_deref(), Some("password"));
        assert!(!auth.admin);
        assert_eq!(auth.data, json!({"uid": "ada", "provider": "password"}));
    }

    #[test]
    fn test_id_token_payload() {
        let auth = AuthClaims::from_token(&claims(json!({"sub": "u1", "provider_id": "anonymous", "iat": 1})));
        assert_eq!(auth.uid.as_deref(), Some("u1"));
        assert_eq!(auth.provider.as_deref(), Some("anonymous"));
        assert_eq!(auth.data["token"]["sub"], json!("u1"));

        let auth = AuthClaims::from_token(&claims(json!({"sub": "u1", "user_id": "u2"})));
        assert_eq!(auth.uid.as_deref(), Some("u2"));
    }

    #[test]
    fn test_admin_flag() {
        let auth = AuthClaims::from_token(&claims(json!({"admin": true, "d": {}})));
        assert!(auth.admin);
        assert!(AuthClaims::admin().admin);
    }
}
