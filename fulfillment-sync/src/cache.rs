//! Short-TTL memoization for idempotent catalog lookups
//!
//! One fixed TTL for the whole cache; expiry is lazy (an expired `get`
//! deletes the entry and returns `None`). Never used for order-mutating
//! calls.

use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};

struct CacheEntry {
    value: Value,
    stored_at: Instant,
}

/// TTL cache keyed by request identity (e.g. `catalog:product:71`)
pub struct ResponseCache {
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Fetch a live entry; expired entries are removed on the way out
    pub fn get(&self, key: &str) -> Option<Value> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                if entry.stored_at.elapsed() < self.ttl {
                    return Some(entry.value.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every entry whose key starts with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_returns_live_entries() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.set("catalog:product:1", json!({"id": 1}));
        assert_eq!(cache.get("catalog:product:1"), Some(json!({"id": 1})));
        assert_eq!(cache.get("catalog:product:2"), None);
    }

    #[test]
    fn expired_entries_are_removed_lazily() {
        let cache = ResponseCache::new(Duration::ZERO);
        cache.set("catalog:variant:9", json!("gone"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("catalog:variant:9"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_prefix_drops_matching_keys_only() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.set("catalog:product:1", json!(1));
        cache.set("catalog:product:2", json!(2));
        cache.set("catalog:search:mug", json!([]));
        cache.invalidate_prefix("catalog:product:");
        assert_eq!(cache.get("catalog:product:1"), None);
        assert_eq!(cache.get("catalog:search:mug"), Some(json!([])));
    }
}
