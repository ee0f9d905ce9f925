//! Query directive translation.
//!
//! A `q` listen carries a map of short directive keys. [`translate`] applies
//! them in the order they appear on the wire, so later directives refine or
//! override earlier ones the same way chained builder calls would.
//!
//! | key  | meaning                                                     |
//! |------|-------------------------------------------------------------|
//! | `sp` | start at value (`sn` optional key name)                     |
//! | `ep` | end at value (`en` optional key name)                       |
//! | `i`  | order by `.key`, `.value` or a child path                   |
//! | `l`  | limit; first when `vf == "l"`, otherwise last               |

use serde::Serialize;
use serde_json::{Map, Value};

/// Ordering applied to children before ranges and limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum OrderBy {
    #[default]
    Priority,
    Key,
    Value,
    Child(String),
}

/// A range endpoint: a sort value plus an optional key tiebreaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bound {
    pub value: Value,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Limit {
    First(usize),
    Last(usize),
}

/// An ordered, filtered view of a location.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Query {
    pub order_by: OrderBy,
    pub start: Option<Bound>,
    pub end: Option<Bound>,
    pub limit: Option<Limit>,
}

impl Query {
    pub fn order_by_key(mut self) -> Self {
        self.order_by = OrderBy::Key;
        self
    }

    pub fn order_by_value(mut self) -> Self {
        self.order_by = OrderBy::Value;
        self
    }

    pub fn order_by_child(mut self, path: impl Into<String>) -> Self {
        self.order_by = OrderBy::Child(path.into());
        self
    }

    pub fn start_at(mut self, value: Value, name: Option<String>) -> Self {
        self.start = Some(Bound { value, name });
        self
    }

    pub fn end_at(mut self, value: Value, name: Option<String>) -> Self {
        self.end = Some(Bound { value, name });
        self
    }

    pub fn limit_to_first(mut self, n: usize) -> Self {
        self.limit = Some(Limit::First(n));
        self
    }

    pub fn limit_to_last(mut self, n: usize) -> Self {
        self.limit = Some(Limit::Last(n));
        self
    }

    /// True when the query leaves the location unfiltered.
    pub fn is_default(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.limit.is_none()
    }

    /// Stable identity used to key listeners on the same path.
    pub fn identity(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Applies wire directives to `base`. Unrecognized keys are ignored.
pub fn translate(base: Query, directives: &Map<String, Value>) -> Query {
    let name_of = |key: &str| {
        directives
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    directives.iter().fold(base, |query, (key, value)| match key.as_str() {
        "sp" => query.start_at(value.clone(), name_of("sn")),
        "ep" => query.end_at(value.clone(), name_of("en")),
        "i" => match value.as_str() {
            Some(".key") => query.order_by_key(),
            Some(".value") => query.order_by_value(),
            Some(child) => query.order_by_child(child),
            None => {
                log::debug!("Ignoring non-string order directive {value}");
                query
            }
        },
        "l" => match value.as_u64() {
            Some(n) if directives.get("vf").and_then(Value::as_str) == Some("l") => {
                query.limit_to_first(n as usize)
            }
            Some(n) => query.limit_to_last(n as usize),
            None => {
                log::debug!("Ignoring non-numeric limit directive {value}");
                query
            }
        },
        _ => query,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn directives(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_order_by_key_with_range_and_limit() {
        let q = translate(
            Query::default(),
            &directives(json!({"i": ".key", "sp": "b", "ep": "d", "l": 2, "vf": "l"})),
        );
        assert_eq!(q.order_by, OrderBy::Key);
        assert_eq!(q.start, Some(Bound { value: json!("b"), name: None }));
        assert_eq!(q.end, Some(Bound { value: json!("d"), name: None }));
        assert_eq!(q.limit, Some(Limit::First(2)));
    }

    #[test]
    fn test_limit_defaults_to_last() {
        let q = translate(Query::default(), &directives(json!({"l": 3, "vf": "r"})));
        assert_eq!(q.limit, Some(Limit::Last(3)));
        let q = translate(Query::default(), &directives(json!({"l": 3})));
        assert_eq!(q.limit, Some(Limit::Last(3)));
    }

    #[test]
    fn test_named_bounds() {
        let q = translate(
            Query::default(),
            &directives(json!({"i": "age", "sp": 10, "sn": "k1", "ep": 20, "en": "k9"})),
        );
        assert_eq!(q.order_by, OrderBy::Child("age".into()));
        assert_eq!(q.start.unwrap().name.as_deref(), Some("k1"));
        assert_eq!(q.end.unwrap().name.as_deref(), Some("k9"));
    }

    #[test]
    fn test_order_by_value_and_unknown_keys() {
        let q = translate(Query::default(), &directives(json!({"i": ".value", "zz": 1})));
        assert_eq!(q.order_by, OrderBy::Value);
        assert!(q.is_default());
    }

    #[test]
    fn test_later_directives_override() {
        let q = translate(
            Query::default().order_by_child("x"),
            &directives(json!({"i": ".key"})),
        );
        assert_eq!(q.order_by, OrderBy::Key);
    }

    #[test]
    fn test_identity_distinguishes_queries() {
        let a = Query::default().limit_to_first(1);
        let b = Query::default().limit_to_last(1);
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a.identity(), Query::default().limit_to_first(1).identity());
    }
}
