//! Server-timestamp substitution.
//!
//! Clients write `{".sv": "timestamp"}` wherever they want the server's clock.
//! Every sentinel in one payload resolves to the same instant, read from the
//! clock exactly once.

use serde_json::{json, Map, Value};

use crate::utils::clock::Clock;

/// The sentinel value clients send in place of a timestamp.
pub fn server_timestamp() -> Value {
    json!({".sv": "timestamp"})
}

/// Whether `value` is exactly the timestamp sentinel.
pub fn is_server_timestamp(value: &Value) -> bool {
    matches!(value, Value::Object(map)
        if map.len() == 1 && map.get(".sv").and_then(Value::as_str) == Some("timestamp"))
}

/// Replaces every sentinel in `payload` with one reading of `clock`.
pub fn resolve(payload: Value, clock: &Clock) -> Value {
    let now = clock.now();
    replace_with(payload, now)
}

/// Replaces every sentinel in `payload` with `time`.
pub fn replace_with(payload: Value, time: i64) -> Value {
    if is_server_timestamp(&payload) {
        return Value::from(time);
    }
    match payload {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, replace_with(v, time)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| replace_with(v, time)).collect())
        }
        scalar => scalar,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_bare_sentinel() {
        let clock = Clock::fixed(1_500_000_000_000);
        assert_eq!(resolve(server_timestamp(), &clock), json!(1_500_000_000_000_i64));
    }

    #[test]
    fn test_nested_sentinels_share_one_reading() {
        let calls = Arc::new(AtomicI64::new(0));
        let c = calls.clone();
        let clock = Clock::from_fn(move || 1000 + c.fetch_add(1, Ordering::SeqCst));

        let out = resolve(
            json!({"foo": server_timestamp(), "bar": {"baz": server_timestamp()}}),
            &clock,
        );
        assert_eq!(out, json!({"foo": 1000, "bar": {"baz": 1000}}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_non_sentinel_values_untouched() {
        let clock = Clock::fixed(7);
        let payload = json!({
            "a": 1,
            "b": "text",
            "c": {".sv": "other"},
            "d": {".sv": "timestamp", "extra": true},
            "e": [server_timestamp(), null]
        });
        let out = resolve(payload, &clock);
        assert_eq!(out["a"], json!(1));
        assert_eq!(out["c"], json!({".sv": "other"}));
        assert_eq!(out["d"], json!({".sv": "timestamp", "extra": true}));
        assert_eq!(out["e"], json!([7, null]));
    }
}
