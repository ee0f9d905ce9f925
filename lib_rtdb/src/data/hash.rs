//! # Content Hash
//!
//! Canonical hash of a stored value, used as the compare-and-swap token for
//! transactional sets. Clients compute the same hash locally, so the encoding
//! must match byte for byte:
//!
//! - `null` hashes to the empty string.
//! - A truthy `.priority` prefixes `priority:<scalar>:`.
//! - A truthy `.value` replaces the value before hashing.
//! - Objects append `:<key>:<hash(child)>` per key in UTF-16 code-unit order.
//! - Scalars append `<typeof>:<value>`, numbers as big-endian IEEE-754 hex.
//!
//! The accumulated string is SHA-1 hashed and base64 encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use sha1::{Digest, Sha1};

const PRIORITY_KEY: &str = ".priority";
const VALUE_KEY: &str = ".value";

/// Computes the transaction hash of an exported value.
pub fn content_hash(value: &Value) -> String {
    if value.is_null() {
        return String::new();
    }

    let mut input = String::new();
    if let Some(priority) = value.get(PRIORITY_KEY).filter(|p| is_truthy(p)) {
        input.push_str("priority:");
        input.push_str(&hash_priority(priority));
        input.push(':');
    }

    let value = match value.get(VALUE_KEY) {
        Some(inner) if is_truthy(inner) => inner,
        _ => value,
    };

    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().filter(|k| *k != PRIORITY_KEY).collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));
            for key in keys {
                input.push(':');
                input.push_str(key);
                input.push(':');
                input.push_str(&content_hash(&map[key.as_str()]));
            }
        }
        Value::Array(items) => {
            let mut keys: Vec<String> = (0..items.len()).map(|i| i.to_string()).collect();
            keys.sort();
            for key in keys {
                let index: usize = key.parse().unwrap_or_default();
                input.push(':');
                input.push_str(&key);
                input.push(':');
                input.push_str(&content_hash(&items[index]));
            }
        }
        scalar => input.push_str(&hash_scalar(scalar)),
    }

    STANDARD.encode(Sha1::digest(input.as_bytes()))
}

fn hash_scalar(value: &Value) -> String {
    match value {
        Value::Bool(b) => format!("boolean:{b}"),
        Value::Number(n) => format!("number:{}", ieee754_hex(n.as_f64().unwrap_or_default())),
        Value::String(s) => format!("string:{s}"),
        other => format!("object:{}", js_string(other)),
    }
}

fn hash_priority(priority: &Value) -> String {
    match priority {
        Value::Number(n) => format!("number:{}", ieee754_hex(n.as_f64().unwrap_or_default())),
        other => format!("string:{}", js_string(other)),
    }
}

fn ieee754_hex(n: f64) -> String {
    format!("{:016x}", n.to_bits())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Object(_) | Value::Array(_) => true,
    }
}

fn js_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(js_string).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}
