//! Path normalization for inbound requests.
//!
//! A request path such as `/users/ada/.priority` addresses the priority of
//! `users/ada`. Normalization strips that suffix, drops one leading slash and
//! remembers whether the suffix was present.

use regex::Regex;
use serde::Serialize;
use static_init::dynamic;

#[dynamic]
static PRIORITY_SUFFIX: Regex = Regex::new(r"/?\.priority$").expect("static pattern compiles");

/// A request path split into its data location and priority flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPath {
    /// Location in the data tree, without a leading slash or `.priority` suffix.
    pub path: String,
    /// The path exactly as the client sent it.
    pub full_path: String,
    /// Whether the request targets the `.priority` of `path`.
    pub is_priority_path: bool,
}

/// Normalizes a raw request path.
pub fn normalize_path(raw: &str) -> NormalizedPath {
    let is_priority_path = PRIORITY_SUFFIX.is_match(raw);
    let stripped = PRIORITY_SUFFIX.replace(raw, "");
    let path = stripped.strip_prefix('/').unwrap_or(&stripped).to_string();

    NormalizedPath {
        path,
        full_path: raw.to_string(),
        is_priority_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_leading_slash() {
        let n = normalize_path("/a/b");
        assert_eq!(n.path, "a/b");
        assert_eq!(n.full_path, "/a/b");
        assert!(!n.is_priority_path);
    }

    #[test]
    fn test_priority_suffix() {
        let n = normalize_path("a/b/c/.priority");
        assert_eq!(n.path, "a/b/c");
        assert_eq!(n.full_path, "a/b/c/.priority");
        assert!(n.is_priority_path);

        let n = normalize_path("/users/ada/.priority");
        assert_eq!(n.path, "users/ada");
        assert!(n.is_priority_path);
    }

    #[test]
    fn test_root_paths() {
        assert_eq!(normalize_path("/").path, "");
        assert_eq!(normalize_path("").path, "");

        let n = normalize_path("/.priority");
        assert_eq!(n.path, "");
        assert!(n.is_priority_path);
    }

    #[test]
    fn test_priority_must_be_a_suffix() {
        let n = normalize_path("/.priority/child");
        assert_eq!(n.path, ".priority/child");
        assert!(!n.is_priority_path);
    }

    #[test]
    fn test_normalizing_twice_is_stable() {
        let once = normalize_path("/a/b/.priority");
        let twice = normalize_path(&once.path);
        assert_eq!(twice.path, once.path);
        assert!(!twice.is_priority_path);
    }
}
