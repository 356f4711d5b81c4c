//! Memoized backend responses.
//!
//! # Responsibilities
//! - Decide whether a request class is cache-eligible (method + prefix allow-list)
//! - Derive a key from the method and the full backend URL
//! - Store successful results with a TTL and bounded size
//!
//! # Design Decisions
//! - Least-recently-used eviction; a hit refreshes recency
//! - Expiry is checked on read, expired entries are dropped then
//! - Query pairs are sorted so equivalent URLs share an entry
//! - The lock is never held across an await

use std::num::NonZeroUsize;
use std::time::Duration;

use axum::http::Method;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::proxy::upstream::ForwardResult;
use crate::routing::RequestPattern;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: ForwardResult,
    expires_at: Instant,
}

/// Bounded TTL cache of backend results.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<ForwardResult> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn put(&self, key: String, value: ForwardResult) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.lock().put(key, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Allow-list of cache-eligible request classes.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    rules: Vec<RequestPattern>,
}

impl CachePolicy {
    pub fn new(rules: Vec<RequestPattern>) -> Self {
        Self { rules }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config
                .rules
                .iter()
                .filter_map(|rule| RequestPattern::new(&rule.method, &rule.path_prefix))
                .collect(),
        )
    }

    pub fn is_eligible(&self, method: &Method, path: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(method, path))
    }
}

/// Cache key: method plus the backend URL with its query pairs sorted.
pub fn cache_key(method: &Method, url: &str) -> String {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, query),
        None => return format!("{} {}", method, url),
    };

    let mut pairs: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
    pairs.sort_unstable();
    if pairs.is_empty() {
        format!("{} {}", method, base)
    } else {
        format!("{} {}?{}", method, base, pairs.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    fn result(body: serde_json::Value) -> ForwardResult {
        ForwardResult::new(StatusCode::OK, body)
    }

    fn cache(capacity: usize) -> ResponseCache {
        ResponseCache::new(NonZeroUsize::new(capacity).unwrap(), Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = cache(8);
        cache.put("GET http://a/x".into(), result(json!({"n": 1})));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("GET http://a/x").unwrap().body, json!({"n": 1}));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("GET http://a/x").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cache = cache(2);
        cache.put("a".into(), result(json!(1)));
        cache.put("b".into(), result(json!(2)));

        // Touch "a" so "b" becomes the eviction candidate
        assert!(cache.get("a").is_some());
        cache.put("c".into(), result(json!(3)));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_key_sorts_query_pairs() {
        assert_eq!(
            cache_key(&Method::GET, "http://a:8001/items?b=2&a=1"),
            cache_key(&Method::GET, "http://a:8001/items?a=1&b=2")
        );
        assert_ne!(
            cache_key(&Method::GET, "http://a:8001/items"),
            cache_key(&Method::HEAD, "http://a:8001/items")
        );
        assert_eq!(cache_key(&Method::GET, "http://a/x?"), "GET http://a/x");
    }

    #[test]
    fn test_eligibility_allow_list() {
        let policy = CachePolicy::from_config(&CacheConfig::default());
        assert!(policy.is_eligible(&Method::GET, "/service-a/items"));
        assert!(!policy.is_eligible(&Method::POST, "/service-a/items"));

        let narrow = CachePolicy::new(vec![RequestPattern::new("GET", "/service-b").unwrap()]);
        assert!(narrow.is_eligible(&Method::GET, "/service-b/x"));
        assert!(!narrow.is_eligible(&Method::GET, "/service-a/x"));
    }
}
