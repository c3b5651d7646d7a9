//! Route pattern grammar.
//!
//! ```text
//! [METHOD ]PATH
//!
//! GET /users/{id}       one named segment, exact path
//! GET /files/{rest...}  named remainder of the path (may be empty)
//! /static/              trailing slash: the path and its whole subtree
//! GET /api/{$}          `{$}` pins a trailing-slash path to itself only
//! ```
//!
//! A parsed [`Pattern`] lowers to one or two radix-tree keys understood by
//! [`matchit`]; the dispatch table is built from those keys at freeze time.

use std::fmt;

use http::Method;

/// Capture name used for the implicit remainder of a subtree pattern.
pub(crate) const SUBTREE_PARAM: &str = "__subtree";

#[derive(Clone, Debug)]
pub(crate) struct Pattern {
    /// `None` matches every method.
    pub(crate) method: Option<Method>,
    /// The path as written, after prefix joining (`/api/{$}`).
    pub(crate) path: String,
    pub(crate) keys: Vec<TreeKey>,
    /// Count of literal path bytes; longer literal prefixes are more specific.
    pub(crate) literal_len: usize,
}

/// One radix-tree key a pattern is registered under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TreeKey {
    pub(crate) route: String,
    /// `route` with capture names erased; two keys with the same shape claim
    /// the same requests.
    pub(crate) shape: String,
    /// True when the key ends in a catch-all segment.
    pub(crate) prefix: bool,
    /// Implied by a subtree or `{name...}` pattern rather than written out;
    /// an explicit registration of the same key takes precedence.
    pub(crate) companion: bool,
    /// Capture that must be reported as empty when this key matches.
    pub(crate) empty_capture: Option<String>,
}

/// How specific a match is. Exact (non catch-all) matches beat prefix
/// matches; among equals, the longer literal path wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Specificity {
    pub(crate) exact: bool,
    pub(crate) literal_len: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct PatternError {
    pattern: String,
    reason: &'static str,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid route pattern `{}`: {}", self.pattern, self.reason)
    }
}

impl Pattern {
    /// Parses `pattern` registered under the group prefix `prefix`.
    pub(crate) fn parse(prefix: &str, pattern: &str) -> Result<Self, PatternError> {
        let err = |reason| PatternError { pattern: pattern.to_owned(), reason };

        let trimmed = pattern.trim();
        let (method, raw_path) = match trimmed.split_once([' ', '\t']) {
            Some((token, rest)) => {
                let method = Method::from_bytes(token.as_bytes()).map_err(|_| err("bad method token"))?;
                (Some(method), rest.trim_start())
            }
            None => (None, trimmed),
        };

        if !raw_path.starts_with('/') {
            return Err(err("path must start with `/`"));
        }

        let path = join(prefix, raw_path);
        let segments: Vec<&str> = path[1..].split('/').collect();
        let last = segments.len() - 1;

        let mut route = String::with_capacity(path.len() + 16);
        let mut shape = String::with_capacity(path.len());
        let mut literal_len = 0;
        let mut exact_end = false;
        let mut rest_name = None;

        for (i, seg) in segments.iter().enumerate() {
            route.push('/');
            shape.push('/');
            literal_len += 1;

            if *seg == "{$}" {
                if i != last {
                    return Err(err("`{$}` must be the final segment"));
                }
                exact_end = true;
                continue;
            }

            if let Some(inner) = seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if let Some(name) = inner.strip_suffix("...") {
                    if i != last {
                        return Err(err("`{name...}` must be the final segment"));
                    }
                    check_name(name).map_err(err)?;
                    route.push_str(&format!("{{*{name}}}"));
                    shape.push_str("{*}");
                    rest_name = Some(name.to_owned());
                } else {
                    check_name(inner).map_err(err)?;
                    route.push_str(seg);
                    shape.push_str("{}");
                }
                continue;
            }

            if seg.contains(['{', '}']) {
                return Err(err("a capture must fill a whole segment"));
            }
            route.push_str(seg);
            shape.push_str(seg);
            literal_len += seg.len();
        }

        let keys = if let Some(name) = rest_name {
            // `{rest...}` also matches the bare directory with an empty capture.
            let dir = route[..route.rfind('/').map_or(0, |i| i + 1)].to_owned();
            let dir_shape = shape[..shape.rfind('/').map_or(0, |i| i + 1)].to_owned();
            vec![
                TreeKey::new(dir, dir_shape, false, true).with_empty_capture(name),
                TreeKey::new(route, shape, true, false),
            ]
        } else if exact_end {
            vec![TreeKey::new(route, shape, false, false)]
        } else if route.ends_with('/') {
            let catch_all = format!("{route}{{*{SUBTREE_PARAM}}}");
            let catch_all_shape = format!("{shape}{{*}}");
            vec![
                TreeKey::new(route, shape, false, true),
                TreeKey::new(catch_all, catch_all_shape, true, false),
            ]
        } else {
            vec![TreeKey::new(route, shape, false, false)]
        };

        Ok(Self { method, path, keys, literal_len })
    }

    pub(crate) fn specificity(&self, key: &TreeKey) -> Specificity {
        Specificity { exact: !key.prefix, literal_len: self.literal_len }
    }
}

impl TreeKey {
    fn new(route: String, shape: String, prefix: bool, companion: bool) -> Self {
        Self { route, shape, prefix, companion, empty_capture: None }
    }

    fn with_empty_capture(mut self, name: String) -> Self {
        self.empty_capture = Some(name);
        self
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Some(m) => write!(f, "{m} {}", self.path),
            None => f.write_str(&self.path),
        }
    }
}

fn check_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() || name.starts_with("__") || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err("capture names must be non-empty identifiers");
    }
    Ok(())
}

/// Joins a group prefix and a path with exactly one slash between them.
///
/// `join("/api/", "/v1/") == "/api/v1/"`, `join("/", "/x") == "/x"`.
pub(crate) fn join(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let path = path.trim_start_matches('/');
    let mut out = String::with_capacity(prefix.len() + path.len() + 2);
    out.push('/');
    if !prefix.is_empty() {
        out.push_str(prefix);
        out.push('/');
    }
    out.push_str(path);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes(p: &Pattern) -> Vec<&str> {
        p.keys.iter().map(|k| k.route.as_str()).collect()
    }

    #[test]
    fn joins_group_prefixes() {
        assert_eq!(join("/", "/x"), "/x");
        assert_eq!(join("/api/", "/v1/"), "/api/v1/");
        assert_eq!(join("/without", "/mw/{$}"), "/without/mw/{$}");
        assert_eq!(join("api", "docs"), "/api/docs");
        assert_eq!(join("", "/"), "/");
    }

    #[test]
    fn method_token_is_optional() {
        let p = Pattern::parse("/", "GET /hello").unwrap();
        assert_eq!(p.method, Some(Method::GET));
        assert_eq!(routes(&p), ["/hello"]);

        let p = Pattern::parse("/", "/hello").unwrap();
        assert_eq!(p.method, None);
    }

    #[test]
    fn trailing_slash_is_a_subtree() {
        let p = Pattern::parse("/api/", "/").unwrap();
        assert_eq!(routes(&p), ["/api/", "/api/{*__subtree}"]);
        assert!(p.keys[0].companion);
        assert!(p.keys[1].prefix);
    }

    #[test]
    fn exact_end_marker_pins_the_path() {
        let p = Pattern::parse("/api/", "GET /{$}").unwrap();
        assert_eq!(p.path, "/api/{$}");
        assert_eq!(routes(&p), ["/api/"]);
        assert!(!p.keys[0].prefix);
        assert!(!p.keys[0].companion);
    }

    #[test]
    fn captures_lower_to_tree_syntax() {
        let p = Pattern::parse("/", "GET /users/{id}/posts").unwrap();
        assert_eq!(routes(&p), ["/users/{id}/posts"]);

        let p = Pattern::parse("/", "/files/{path...}").unwrap();
        assert_eq!(routes(&p), ["/files/", "/files/{*path}"]);
        assert_eq!(p.keys[1].shape, "/files/{*}");
        assert_eq!(p.keys[0].empty_capture.as_deref(), Some("path"));
    }

    #[test]
    fn shape_ignores_capture_names() {
        let a = Pattern::parse("/", "GET /users/{id}").unwrap();
        let b = Pattern::parse("/users/", "GET /{name}").unwrap();
        assert_ne!(a.keys[0].route, b.keys[0].route);
        assert_eq!(a.keys[0].shape, b.keys[0].shape);
    }

    #[test]
    fn literal_length_orders_specificity() {
        let root = Pattern::parse("/", "/").unwrap();
        let api = Pattern::parse("/", "/api/").unwrap();
        assert!(api.specificity(&api.keys[1]) > root.specificity(&root.keys[1]));
        assert!(root.specificity(&root.keys[0]) > api.specificity(&api.keys[1]));
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(Pattern::parse("/", "GET hello").is_err());
        assert!(Pattern::parse("/", "/a/{$}/b").is_err());
        assert!(Pattern::parse("/", "/a/x{id}").is_err());
        assert!(Pattern::parse("/", "/a/{rest...}/b").is_err());
        assert!(Pattern::parse("/", "/a/{}").is_err());
        assert!(Pattern::parse("/", "G(T /").is_err());
    }
}
