//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the route owning an inbound path
//! - Build the backend URL with the prefix stripped
//!
//! # Design Decisions
//! - Immutable after construction; refreshed by swapping the whole table
//! - O(n) path prefix scan (acceptable for typical route counts)
//! - Longest prefix wins, so lookups stay deterministic even if a
//!   hand-built table has nested prefixes
//! - Explicit NoMatch rather than silent default

use crate::config::RouteConfig;
use crate::routing::matcher::PathPrefixMatcher;

/// A compiled backend route.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub matcher: PathPrefixMatcher,
    /// Base URL without a trailing slash.
    pub base_url: String,
    pub health_path: String,
}

impl Route {
    pub fn from_config(config: &RouteConfig) -> Self {
        Self {
            name: config.name.clone(),
            matcher: PathPrefixMatcher::new(&config.prefix),
            base_url: config.url.trim_end_matches('/').to_string(),
            health_path: config.health_path.clone(),
        }
    }

    /// Backend URL for a stripped path and optional raw query string.
    pub fn target_url(&self, rest: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, rest, q),
            _ => format!("{}{}", self.base_url, rest),
        }
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url, self.health_path)
    }
}

/// Result of a successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    /// Inbound path with the route prefix removed.
    pub rest: &'a str,
}

/// Immutable table of compiled routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn from_config(configs: &[RouteConfig]) -> Self {
        Self {
            routes: configs.iter().map(Route::from_config).collect(),
        }
    }

    pub fn resolve<'a>(&'a self, path: &'a str) -> Option<RouteMatch<'a>> {
        self.routes
            .iter()
            .filter_map(|route| route.matcher.strip(path).map(|rest| RouteMatch { route, rest }))
            .max_by_key(|m| m.route.matcher.prefix().len())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}
