//! Route matching logic.
//!
//! # Responsibilities
//! - Match path prefix on segment boundaries (case-sensitive)
//! - Match method + prefix patterns for cache and transform rules
//!
//! # Design Decisions
//! - `/service-a` matches `/service-a` and `/service-a/...`, never `/service-ab`
//! - Prefix `/` matches every path
//! - No regex to guarantee O(n) matching

use axum::http::Method;

/// Matches the request path prefix on segment boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    /// The prefix is normalized to a leading `/` and no trailing `/`.
    pub fn new(prefix: impl AsRef<str>) -> Self {
        let trimmed = prefix.as_ref().trim().trim_matches('/');
        Self {
            prefix: format!("/{}", trimmed),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_root(&self) -> bool {
        self.prefix == "/"
    }

    pub fn matches(&self, path: &str) -> bool {
        self.strip(path).is_some()
    }

    /// Remove the prefix from `path`, returning the remainder (always rooted).
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.is_root() {
            return Some(path);
        }
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() {
            Some("/")
        } else if rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// True when some path could match both prefixes.
    pub fn overlaps(&self, other: &PathPrefixMatcher) -> bool {
        self.matches(&other.prefix) || other.matches(&self.prefix)
    }
}

/// A method + path prefix pair, e.g. `POST /service-b`.
#[derive(Debug, Clone)]
pub struct RequestPattern {
    method: Method,
    prefix: PathPrefixMatcher,
}

impl RequestPattern {
    /// Build a pattern; `None` when the method is not a valid token.
    pub fn new(method: &str, prefix: &str) -> Option<Self> {
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes()).ok()?;
        Some(Self {
            method,
            prefix: PathPrefixMatcher::new(prefix),
        })
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.method == method && self.prefix.matches(path)
    }
}
