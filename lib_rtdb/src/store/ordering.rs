//! Child ordering and query views.
//!
//! Values order as `null < false < true < numbers < strings < objects`.
//! Keys that look like 32-bit integers sort numerically ahead of all other
//! keys, which sort lexicographically. Ties on the ordering value fall back to
//! key order.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::data::query::{Bound, Limit, OrderBy, Query};
use crate::store::tree::{self, PRIORITY_KEY, VALUE_KEY};

pub fn compare_keys(a: &str, b: &str) -> Ordering {
    match (integer_key(a), integer_key(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn integer_key(key: &str) -> Option<i32> {
    key.parse::<i32>().ok().filter(|n| n.to_string() == key)
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) | Value::Object(_) => 5,
    }
}

pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    type_rank(a).cmp(&type_rank(b)).then_with(|| match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or_default(), y.as_f64().unwrap_or_default());
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    })
}

struct Entry<'a> {
    key: &'a str,
    node: &'a Value,
    sort: Value,
}

fn sort_value(key: &str, node: &Value, order_by: &OrderBy) -> Value {
    match order_by {
        OrderBy::Priority => tree::priority_of(node).cloned().unwrap_or(Value::Null),
        OrderBy::Key => Value::String(key.to_string()),
        OrderBy::Value => tree::strip_priorities(node),
        OrderBy::Child(path) => {
            let plain = tree::strip_priorities(node);
            tree::get(&plain, &tree::segments(path))
                .cloned()
                .unwrap_or(Value::Null)
        }
    }
}

fn compare_entries(a: &Entry<'_>, b: &Entry<'_>, order_by: &OrderBy) -> Ordering {
    match order_by {
        OrderBy::Key => compare_keys(a.key, b.key),
        _ => compare_values(&a.sort, &b.sort).then_with(|| compare_keys(a.key, b.key)),
    }
}

fn compare_to_bound(entry: &Entry<'_>, bound: &Bound, order_by: &OrderBy) -> Ordering {
    match order_by {
        OrderBy::Key => {
            let key = match &bound.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            compare_keys(entry.key, &key)
        }
        _ => compare_values(&entry.sort, &bound.value).then_with(|| {
            bound
                .name
                .as_deref()
                .map_or(Ordering::Equal, |name| compare_keys(entry.key, name))
        }),
    }
}

/// The children of `node` selected by `query`, in query order.
///
/// Primitives and unfiltered queries return the node unchanged.
pub fn apply_query(node: &Value, query: &Query) -> Value {
    let Value::Object(map) = node else {
        return node.clone();
    };
    if query.is_default() || map.contains_key(VALUE_KEY) {
        return node.clone();
    }

    let mut entries: Vec<Entry<'_>> = map
        .iter()
        .filter(|(k, _)| k.as_str() != PRIORITY_KEY)
        .map(|(k, v)| Entry {
            key: k,
            node: v,
            sort: sort_value(k, v, &query.order_by),
        })
        .collect();
    entries.sort_by(|a, b| compare_entries(a, b, &query.order_by));

    if let Some(start) = &query.start {
        entries.retain(|e| compare_to_bound(e, start, &query.order_by) != Ordering::Less);
    }
    if let Some(end) = &query.end {
        entries.retain(|e| compare_to_bound(e, end, &query.order_by) != Ordering::Greater);
    }
    match query.limit {
        Some(Limit::First(n)) => entries.truncate(n),
        Some(Limit::Last(n)) => {
            let skip = entries.len().saturating_sub(n);
            entries.drain(..skip);
        }
        None => {}
    }

    if entries.is_empty() {
        return Value::Null;
    }
    Value::Object(
        entries
            .into_iter()
            .map(|e| (e.key.to_string(), e.node.clone()))
            .collect::<Map<String, Value>>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(v: &Value) -> Vec<String> {
        v.as_object().map(|m| m.keys().cloned().collect()).unwrap_or_default()
    }

    #[test]
    fn test_key_order_puts_integers_first() {
        let mut k = vec!["b", "10", "a", "2", "-1", "01"];
        k.sort_by(|a, b| compare_keys(a, b));
        assert_eq!(k, vec!["-1", "2", "10", "01", "a", "b"]);
    }

    #[test]
    fn test_value_type_order() {
        let mut v = vec![json!("s"), json!({"o": 1}), json!(3), json!(true), json!(null), json!(false), json!(-2)];
        v.sort_by(compare_values);
        assert_eq!(v, vec![json!(null), json!(false), json!(true), json!(-2), json!(3), json!("s"), json!({"o": 1})]);
    }

    #[test]
    fn test_limit_to_first_by_key() {
        let node = json!({"c": 3, "a": 1, "b": 2});
        let q = Query::default().order_by_key().limit_to_first(2);
        assert_eq!(keys(&apply_query(&node, &q)), vec!["a", "b"]);
    }

    #[test]
    fn test_limit_to_last_by_child() {
        let node = json!({"x": {"age": 30}, "y": {"age": 10}, "z": {"age": 20}});
        let q = Query::default().order_by_child("age").limit_to_last(2);
        assert_eq!(keys(&apply_query(&node, &q)), vec!["z", "x"]);
    }

    #[test]
    fn test_range_by_value() {
        let node = json!({"a": 5, "b": 1, "c": 3, "d": "str"});
        let q = Query::default().order_by_value().start_at(json!(2), None).end_at(json!(5), None);
        assert_eq!(keys(&apply_query(&node, &q)), vec!["c", "a"]);
    }

    #[test]
    fn test_priority_order_and_named_start() {
        let node = json!({
            "a": {".priority": 2, ".value": "x"},
            "b": {".priority": 1, ".value": "y"},
            "c": {".priority": 2, ".value": "z"},
            "d": "no priority"
        });
        let q = Query::default().limit_to_first(10);
        assert_eq!(keys(&apply_query(&node, &q)), vec!["d", "b", "a", "c"]);

        let q = Query::default().start_at(json!(2), Some("c".into()));
        assert_eq!(keys(&apply_query(&node, &q)), vec!["c"]);
    }

    #[test]
    fn test_empty_selection_is_null() {
        let node = json!({"a": 1});
        let q = Query::default().order_by_value().start_at(json!(5), None);
        assert_eq!(apply_query(&node, &q), Value::Null);
    }

    #[test]
    fn test_default_query_returns_node() {
        let node = json!({"a": 1, ".priority": 3});
        assert_eq!(apply_query(&node, &Query::default()), node);
        assert_eq!(apply_query(&json!(4), &Query::default().limit_to_first(1)), json!(4));
    }
}
