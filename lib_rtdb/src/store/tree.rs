//! Pure operations on a data tree in export form.
//!
//! Export form keeps priorities inline: an object child may carry a
//! `.priority` key, and a primitive with a priority is wrapped as
//! `{".priority": p, ".value": v}`. Empty objects never appear; a location
//! with no children is `null`.

use serde_json::{json, Map, Value};

pub const PRIORITY_KEY: &str = ".priority";
pub const VALUE_KEY: &str = ".value";

/// Non-empty segments of a slash-separated path.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// The node at `segs` below `root`, if any.
pub fn get<'a>(root: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    segs.iter().try_fold(root, |node, seg| match node {
        Value::Object(map) if *seg != PRIORITY_KEY && !map.contains_key(VALUE_KEY) => map.get(*seg),
        _ => None,
    })
}

pub fn priority_of(value: &Value) -> Option<&Value> {
    value.get(PRIORITY_KEY).filter(|p| !p.is_null())
}

/// Attaches `priority` to `value`, wrapping primitives.
pub fn with_priority(value: Value, priority: Option<Value>) -> Value {
    match (value, priority) {
        (value, None) => value,
        (Value::Null, Some(_)) => Value::Null,
        (Value::Object(mut map), Some(p)) => {
            map.insert(PRIORITY_KEY.to_string(), p);
            Value::Object(map)
        }
        (primitive, Some(p)) => json!({PRIORITY_KEY: p, VALUE_KEY: primitive}),
    }
}

/// Brings an incoming write into export form: arrays become index-keyed
/// objects, null children and empty objects disappear, and a `.value`
/// wrapper without a priority collapses to its value.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Array(items) => canonicalize(Value::Object(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
        )),
        Value::Object(mut map) => {
            let priority = map.remove(PRIORITY_KEY).filter(|p| !p.is_null());
            if let Some(inner) = map.remove(VALUE_KEY) {
                return with_priority(canonicalize(inner), priority);
            }
            let children: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if children.is_empty() {
                return Value::Null;
            }
            with_priority(Value::Object(children), priority)
        }
        other => other,
    }
}

/// The plain value of a node: priorities removed, wrappers unwrapped.
pub fn strip_priorities(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            if let Some(inner) = map.get(VALUE_KEY) {
                return strip_priorities(inner);
            }
            Value::Object(
                map.iter()
                    .filter(|(k, _)| k.as_str() != PRIORITY_KEY)
                    .map(|(k, v)| (k.clone(), strip_priorities(v)))
                    .collect(),
            )
        }
        other => other.clone(),
    }
}

/// Writes an already-canonical `value` at `segs`, creating intermediate
/// objects and pruning parents left empty by a null write.
pub fn set_at(node: &mut Value, segs: &[&str], value: Value) {
    let Some((first, rest)) = segs.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() || node.get(VALUE_KEY).is_some() {
        // A primitive parent turns into an object but keeps its priority.
        let priority = priority_of(node).cloned();
        let mut map = Map::new();
        if let Some(p) = priority {
            map.insert(PRIORITY_KEY.to_string(), p);
        }
        *node = Value::Object(map);
    }
    let Value::Object(map) = node else {
        return;
    };

    let child = map.entry(first.to_string()).or_insert(Value::Null);
    set_at(child, rest, value);
    if child.is_null() {
        map.remove(*first);
    }
    if map.keys().all(|k| k == PRIORITY_KEY) {
        *node = Value::Null;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_skip_empty() {
        assert_eq!(segments("/a//b/"), vec!["a", "b"]);
        assert!(segments("").is_empty());
    }

    #[test]
    fn test_get_descends_objects_only() {
        let root = json!({"a": {"b": 1, ".priority": 3}, "w": {".value": 2, ".priority": 1}});
        assert_eq!(get(&root, &["a", "b"]), Some(&json!(1)));
        assert_eq!(get(&root, &["a", ".priority"]), None);
        assert_eq!(get(&root, &["w", "x"]), None);
        assert_eq!(get(&root, &[]), Some(&root));
    }

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize(json!({"a": null, "b": {}})), Value::Null);
        assert_eq!(canonicalize(json!(["x", "y"])), json!({"0": "x", "1": "y"}));
        assert_eq!(canonicalize(json!({".value": 5})), json!(5));
        assert_eq!(
            canonicalize(json!({".value": 5, ".priority": 1})),
            json!({".priority": 1, ".value": 5})
        );
        assert_eq!(
            canonicalize(json!({".value": {"k": 1}, ".priority": "p"})),
            json!({"k": 1, ".priority": "p"})
        );
    }

    #[test]
    fn test_strip_priorities() {
        let v = json!({"a": {".priority": 1, ".value": "x"}, "b": {"c": true, ".priority": "p"}, ".priority": 9});
        assert_eq!(strip_priorities(&v), json!({"a": "x", "b": {"c": true}}));
    }

    #[test]
    fn test_set_creates_and_prunes() {
        let mut root = Value::Null;
        set_at(&mut root, &["a", "b", "c"], json!(1));
        assert_eq!(root, json!({"a": {"b": {"c": 1}}}));

        set_at(&mut root, &["a", "d"], json!(2));
        set_at(&mut root, &["a", "b", "c"], Value::Null);
        assert_eq!(root, json!({"a": {"d": 2}}));

        set_at(&mut root, &["a", "d"], Value::Null);
        assert_eq!(root, Value::Null);
    }

    #[test]
    fn test_set_below_primitive_keeps_priority() {
        let mut root = json!({"a": {".priority": 4, ".value": "leaf"}});
        set_at(&mut root, &["a", "x"], json!(true));
        assert_eq!(root, json!({"a": {".priority": 4, "x": true}}));
    }
}
