//! # Token Validator
//!
//! Decodes HMAC-signed auth tokens and checks their validity window against a
//! [`Clock`] the tests can pin.
//!
//! ## Validity window
//!
//! - `since` is `nbf` when present, otherwise `iat`.
//! - `until` is `exp` when present, otherwise `since + 86400`.
//! - A token is valid while `since <= floor(now_ms / 1000) <= until`.
//!
//! A token with neither `nbf` nor `iat`, or with a non-numeric bound, is never
//! valid. Without a configured secret, signatures are not checked at all.

use std::sync::{PoisonError, RwLock};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use crate::error::TokenError;
use crate::utils::clock::{Clock, TimeSource};

/// Decoded token payload, in wire order.
pub type Claims = Map<String, Value>;

/// Seconds a token without `exp` stays valid after `since`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: f64 = 86400.0;

const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Short claim names and the public names [`normalize`] gives them.
const CLAIM_RENAMES: [(&str, &str); 7] = [
    ("d", "auth"),
    ("nbf", "notBefore"),
    ("exp", "expires"),
    ("iat", "iat"),
    ("admin", "admin"),
    ("simulate", "simulate"),
    ("debug", "debug"),
];

#[derive(Debug)]
pub struct TokenValidator {
    secret: RwLock<Option<String>>,
    clock: Clock,
}

impl TokenValidator {
    /// An empty secret is treated as no secret.
    pub fn new(secret: Option<String>, clock: Clock) -> Self {
        Self {
            secret: RwLock::new(secret.filter(|s| !s.is_empty())),
            clock,
        }
    }

    /// Decodes and validates `token`.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_with(token, false)
    }

    /// Decodes `token`. With `no_verify`, neither the signature nor the
    /// validity window is checked.
    pub fn decode_with(&self, token: &str, no_verify: bool) -> Result<Claims, TokenError> {
        let secret = self.secret();
        let header = decode_header(token).map_err(|e| TokenError::Malformed(e.to_string()))?;

        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let key = match (&secret, no_verify) {
            (Some(secret), false) => {
                if !HMAC_ALGORITHMS.contains(&header.alg) {
                    return Err(TokenError::Malformed(format!(
                        "unsupported signing algorithm {:?}",
                        header.alg
                    )));
                }
                DecodingKey::from_secret(secret.as_bytes())
            }
            _ => {
                validation.insecure_disable_signature_validation();
                DecodingKey::from_secret(&[])
            }
        };

        let claims = decode::<Claims>(token, &key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            })?
            .claims;

        if !no_verify && !self.is_valid_timestamp(&claims) {
            return Err(TokenError::InvalidTimestamp);
        }
        log::debug!("Decoded token claims {}", Value::Object(claims.clone()));
        Ok(claims)
    }

    /// Whether `claims` is inside its validity window at the clock's current time.
    pub fn is_valid_timestamp(&self, claims: &Claims) -> bool {
        is_valid_at(claims, self.clock.now().div_euclid(1000))
    }

    pub fn secret(&self) -> Option<String> {
        self.secret
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_secret(&self, secret: Option<String>) {
        *self.secret.write().unwrap_or_else(PoisonError::into_inner) =
            secret.filter(|s| !s.is_empty());
    }

    /// A validator with a different secret on the same clock.
    pub fn with_secret(&self, secret: Option<String>) -> Self {
        Self::new(secret, self.clock.clone())
    }

    /// A validator with the same secret on a new clock.
    pub fn with_time(&self, source: impl Into<TimeSource>) -> Self {
        Self::new(self.secret(), Clock::with_source(source))
    }

    pub fn set_time(&self, source: impl Into<TimeSource>) {
        self.clock.set_time(source);
    }
}

/// Validity check against an explicit time in whole seconds.
pub fn is_valid_at(claims: &Claims, now_secs: i64) -> bool {
    let since = match claims.get("nbf").or_else(|| claims.get("iat")) {
        Some(v) => v.as_f64(),
        None => None,
    };
    let Some(since) = since else {
        return false;
    };
    let until = match claims.get("exp") {
        Some(v) => v.as_f64(),
        None => Some(since + DEFAULT_TOKEN_LIFETIME_SECS),
    };
    let Some(until) = until else {
        return false;
    };

    let now = now_secs as f64;
    since <= now && now <= until
}

/// Renames short claim fields to their public names. Fields absent from the
/// input are absent from the output; fields not listed are dropped.
pub fn normalize(claims: &Claims) -> Claims {
    let mut normal = Claims::new();
    for (short, long) in CLAIM_RENAMES {
        if let Some(v) = claims.get(short).or_else(|| claims.get(long)) {
            normal.insert(long.to_string(), v.clone());
        }
    }
    normal
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn token(secret: &str, claims: Value) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn claims(v: Value) -> Claims {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_decodes_valid_token() {
        let validator = TokenValidator::new(Some("mySecret".into()), Clock::fixed(100 * 1000));
        let t = token(
            "mySecret",
            json!({"v": 0, "d": {"uid": "encodeDecodeTest", "customProperty": "foo"}, "iat": 100}),
        );
        let decoded = validator.decode(&t).unwrap();
        assert_eq!(
            Value::Object(decoded),
            json!({"v": 0, "d": {"uid": "encodeDecodeTest", "customProperty": "foo"}, "iat": 100})
        );
    }

    #[test]
    fn test_bad_signature() {
        let validator = TokenValidator::new(Some("goodSecret".into()), Clock::fixed(100 * 1000));
        let t = token("badSecret", json!({"d": {"uid": "x"}, "iat": 100}));
        assert_eq!(validator.decode(&t), Err(TokenError::InvalidSignature));
        assert!(validator.decode_with(&t, true).is_ok());
    }

    #[test]
    fn test_no_secret_skips_signature() {
        let validator = TokenValidator::new(None, Clock::fixed(100 * 1000));
        let t = token("anything", json!({"d": {"uid": "x"}, "iat": 100}));
        assert!(validator.decode(&t).is_ok());
    }

    #[test]
    fn test_validity_window() {
        let t = token("s", json!({"nbf": 100, "iat": 200, "exp": 300}));
        let validator = TokenValidator::new(Some("s".into()), Clock::fixed(250 * 1000));
        assert!(validator.decode(&t).is_ok());

        validator.set_time(99_999_i64);
        assert_eq!(validator.decode(&t), Err(TokenError::InvalidTimestamp));

        validator.set_time(301_000_i64);
        assert_eq!(validator.decode(&t), Err(TokenError::InvalidTimestamp));

        // Bounds are inclusive; milliseconds are floored to seconds.
        validator.set_time(300_999_i64);
        assert!(validator.decode(&t).is_ok());
    }

    #[test]
    fn test_default_lifetime_from_iat() {
        let c = claims(json!({"iat": 1000}));
        assert!(is_valid_at(&c, 1000));
        assert!(is_valid_at(&c, 1000 + 86400));
        assert!(!is_valid_at(&c, 1000 + 86401));
        assert!(!is_valid_at(&c, 999));
    }

    #[test]
    fn test_missing_or_bad_bounds_are_invalid() {
        assert!(!is_valid_at(&claims(json!({"d": {}})), 0));
        assert!(!is_valid_at(&claims(json!({"iat": "soon"})), 0));
        assert!(!is_valid_at(&claims(json!({"iat": 0, "exp": null})), 0));
    }

    #[test]
    fn test_no_verify_skips_timestamp() {
        let validator = TokenValidator::new(Some("s".into()), Clock::fixed(0));
        let t = token("s", json!({"iat": 5_000_000}));
        assert_eq!(validator.decode(&t), Err(TokenError::InvalidTimestamp));
        assert!(validator.decode_with(&t, true).is_ok());
    }

    #[test]
    fn test_normalize_renames_short_fields() {
        let input = claims(json!({
            "admin": true,
            "d": {"uid": "normalizeTest", "foo": "bar"},
            "debug": true,
            "exp": 300,
            "iat": 200,
            "nbf": 100,
            "simulate": true,
            "v": 0
        }));
        assert_eq!(
            Value::Object(normalize(&input)),
            json!({
                "auth": {"uid": "normalizeTest", "foo": "bar"},
                "notBefore": 100,
                "expires": 300,
                "iat": 200,
                "admin": true,
                "simulate": true,
                "debug": true
            })
        );
    }

    #[test]
    fn test_normalize_keeps_long_names_and_omits_absent() {
        let input = claims(json!({"auth": null, "admin": true, "expires": null}));
        assert_eq!(
            Value::Object(normalize(&input)),
            json!({"auth": null, "expires": null, "admin": true})
        );
    }

    #[test]
    fn test_with_secret_and_with_time() {
        let base = TokenValidator::new(None, Clock::fixed(100 * 1000));
        let t = token("k", json!({"iat": 100}));

        let strict = base.with_secret(Some("other".into()));
        assert_eq!(strict.decode(&t), Err(TokenError::InvalidSignature));
        assert_eq!(base.secret(), None);

        let later = base.with_time(10_000_000_000_i64);
        assert_eq!(later.decode(&t), Err(TokenError::InvalidTimestamp));
        assert!(base.decode(&t).is_ok());
    }

    #[test]
    fn test_empty_secret_means_none() {
        let validator = TokenValidator::new(Some(String::new()), Clock::fixed(0));
        assert_eq!(validator.secret(), None);
        validator.set_secret(Some("x".into()));
        assert_eq!(validator.secret().as_deref(), Some("x"));
    }
}
