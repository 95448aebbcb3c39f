//! In-process Cache (B) — bounded LRU with per-entry TTL (`spec.md` §4.2).
//!
//! Built on `moka::sync::Cache`, which already provides bounded-capacity LRU
//! eviction and lazy expiry on read. Moka does not expose hit/miss counters
//! itself, so they're tracked alongside it with atomics.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::sync::Cache;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    ttl: Duration,
}

struct PerEntryExpiry;

impl Expiry<String, Entry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Aggregate hit/miss statistics for the in-process tier (`spec.md` §3 Cache
/// statistics).
#[derive(Debug, Clone, Copy)]
pub struct LocalCacheStats {
    /// Cache hits.
    pub hits: u64,
    /// Cache misses.
    pub misses: u64,
    /// Current entry count.
    pub entry_count: u64,
}

impl LocalCacheStats {
    /// Hit rate in `[0, 1]`; `0.0` when there have been no operations.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded, TTL-aware, thread-safe in-process cache.
pub struct LocalCache {
    cache: Cache<String, Entry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LocalCache {
    /// Build a cache bounded at `capacity` entries.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .expire_after(PerEntryExpiry)
            .build();
        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fetch a value, recording a hit or miss.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.cache.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` under `key` with the given TTL.
    pub fn set(&self, key: impl Into<String>, value: Vec<u8>, ttl: Duration) {
        self.cache.insert(key.into(), Entry { value, ttl });
    }

    /// Remove a key; a no-op if it is absent.
    pub fn delete(&self, key: &str) {
        self.cache.invalidate(key);
    }

    /// Whether `key` is present and unexpired, without affecting hit/miss
    /// counters.
    #[must_use]
    pub fn exists(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    /// Remove every key matching `predicate`.
    pub fn delete_matching(&self, mut predicate: impl FnMut(&str) -> bool) {
        let matching: Vec<String> = self
            .cache
            .iter()
            .filter(|(k, _)| predicate(k.as_str()))
            .map(|(k, _)| k.as_ref().clone())
            .collect();
        for key in matching {
            self.cache.invalidate(&key);
        }
    }

    /// Current statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> LocalCacheStats {
        self.cache.run_pending_tasks();
        LocalCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.cache.entry_count(),
        }
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

/// Shared handle, cheap to clone across tasks.
pub type SharedLocalCache = Arc<LocalCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn set_then_get_within_ttl_hits() {
        let cache = LocalCache::new(100);
        cache.set("k", b"v".to_vec(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(b"v".to_vec()));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn miss_after_ttl_elapses() {
        let cache = LocalCache::new(100);
        cache.set("k", b"v".to_vec(), Duration::from_millis(10));
        sleep(Duration::from_millis(50));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn delete_removes_entry() {
        let cache = LocalCache::new(100);
        cache.set("k", b"v".to_vec(), Duration::from_secs(60));
        cache.delete("k");
        assert!(!cache.exists("k"));
    }

    #[test]
    fn delete_matching_removes_by_predicate() {
        let cache = LocalCache::new(100);
        cache.set("stock:a", b"1".to_vec(), Duration::from_secs(60));
        cache.set("stock:b", b"2".to_vec(), Duration::from_secs(60));
        cache.set("fx:a", b"3".to_vec(), Duration::from_secs(60));
        cache.delete_matching(|k| k.starts_with("stock:"));
        cache.stats(); // force pending task sync
        assert!(!cache.exists("stock:a"));
        assert!(!cache.exists("stock:b"));
        assert!(cache.exists("fx:a"));
    }
}
