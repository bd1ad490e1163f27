//! Process-local TTL + LRU cache used for read-through caching of list and
//! detail reads in the control plane. Purely a performance optimization —
//! nothing in this crate depends on the cache for correctness, so cache
//! errors (there are none today, but see `get`/`set`) are always treated as
//! misses rather than propagated.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

const DEFAULT_MAX_ENTRIES: usize = 1000;
const EVICTION_FRACTION: f64 = 0.10;

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
    last_accessed: Instant,
    byte_len: usize,
}

struct Inner {
    entries: HashMap<String, Entry>,
    hits: u64,
    misses: u64,
    sets: u64,
    deletes: u64,
}

/// An in-process TTL + LRU cache, keyed by string, storing JSON values.
pub struct Cache {
    inner: Mutex<Inner>,
    max_entries: usize,
}

#[derive(Debug, Serialize, Clone)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub hit_rate: f64,
    pub estimated_bytes: usize,
}

impl Cache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                sets: 0,
                deletes: 0,
            }),
            max_entries,
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let hit = match inner.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_accessed = now;
                Some(entry.value.clone())
            }
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        };
        if hit.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        hit
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value, ttl: Duration) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let byte_len = value.to_string().len();
        inner.entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: now + ttl,
                last_accessed: now,
                byte_len,
            },
        );
        inner.sets += 1;

        if inner.entries.len() > self.max_entries {
            evict_lru(&mut inner.entries, self.max_entries);
        }
    }

    pub fn delete(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.remove(key).is_some() {
            inner.deletes += 1;
        }
    }

    /// Deletes every key whose name starts with `prefix`.
    pub fn delete_prefixed(&self, prefix: &str) {
        let mut inner = self.inner.lock().unwrap();
        let to_remove: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in to_remove {
            inner.entries.remove(&key);
            inner.deletes += 1;
        }
    }

    pub fn has(&self, key: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .get(key)
            .map(|e| e.expires_at > Instant::now())
            .unwrap_or(false)
    }

    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.entries.keys().cloned().collect()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        let total = inner.hits + inner.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            inner.hits as f64 / total as f64
        };
        CacheStats {
            size: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            sets: inner.sets,
            deletes: inner.deletes,
            hit_rate,
            estimated_bytes: inner.entries.values().map(|e| e.byte_len).sum(),
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

fn evict_lru(entries: &mut HashMap<String, Entry>, max_entries: usize) {
    let to_evict = ((max_entries as f64) * EVICTION_FRACTION).ceil() as usize;
    let mut by_access: Vec<(String, Instant)> = entries
        .iter()
        .map(|(k, v)| (k.clone(), v.last_accessed))
        .collect();
    by_access.sort_by_key(|(_, accessed)| *accessed);
    for (key, _) in by_access.into_iter().take(to_evict.max(1)) {
        entries.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_on_empty_cache_is_a_miss() {
        let cache = Cache::new();
        assert!(cache.get("missing").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn set_then_get_is_a_hit() {
        let cache = Cache::new();
        cache.set("job:1", json!({"id": 1}), Duration::from_secs(60));
        assert_eq!(cache.get("job:1"), Some(json!({"id": 1})));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn expired_entry_is_treated_as_a_miss() {
        let cache = Cache::new();
        cache.set("job:1", json!({"id": 1}), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("job:1").is_none());
    }

    #[test]
    fn delete_prefixed_removes_only_matching_keys() {
        let cache = Cache::new();
        cache.set("jobs:a", json!([]), Duration::from_secs(60));
        cache.set("jobs:b", json!([]), Duration::from_secs(60));
        cache.set("job:1", json!({}), Duration::from_secs(60));
        cache.delete_prefixed("jobs:");
        assert!(cache.get("jobs:a").is_none());
        assert!(cache.get("jobs:b").is_none());
        assert!(cache.has("job:1"));
    }

    #[test]
    fn overflow_evicts_least_recently_accessed() {
        let cache = Cache::with_capacity(10);
        for i in 0..10 {
            cache.set(format!("k{i}"), json!(i), Duration::from_secs(60));
        }
        // touch k9 so it is most-recently-used
        cache.get("k9");
        cache.set("k10", json!(10), Duration::from_secs(60));
        assert!(cache.has("k9"));
    }
}
