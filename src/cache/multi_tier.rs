//! Multi-tier Cache (D) — read-through over (B, C), write-through to both,
//! invalidation fan-out (`spec.md` §4.4).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use super::local::SharedLocalCache;
use super::remote::RemoteCachePort;
use crate::error::ChronoResult;
use crate::monitor::SharedMonitor;

/// Multi-tier cache combining the in-process LRU (B) and the remote
/// key/value store (C) behind a single read-through/write-through API
/// (`spec.md` §4.4).
///
/// Concurrent read-through misses on the same key coalesce into a single
/// upstream fetch via a per-key single-flight guard (`spec.md` §5).
pub struct MultiTierCache {
    local: SharedLocalCache,
    remote: Arc<dyn RemoteCachePort>,
    monitor: SharedMonitor,
    cache_name: String,
    in_flight: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl MultiTierCache {
    /// Build a multi-tier cache over `local`/`remote`, recording hit/miss
    /// events against `cache_name` in `monitor`.
    #[must_use]
    pub fn new(
        local: SharedLocalCache,
        remote: Arc<dyn RemoteCachePort>,
        monitor: SharedMonitor,
        cache_name: impl Into<String>,
    ) -> Self {
        Self {
            local,
            remote,
            monitor,
            cache_name: cache_name.into(),
            in_flight: DashMap::new(),
        }
    }

    /// Read-through fetch: (B) first, then (C) repopulating (B) on hit.
    ///
    /// # Errors
    ///
    /// Never returns an error for a remote-cache failure — reads are
    /// fail-open and degrade to a miss (`spec.md` §4.4 Failure semantics).
    /// An `Err` here is reserved for programmer-visible misuse and does not
    /// currently occur.
    pub async fn get(&self, key: &str, ttl_hint: Duration) -> ChronoResult<Option<Vec<u8>>> {
        if let Some(value) = self.local.get(key) {
            self.monitor.record_cache_hit(&self.cache_name);
            return Ok(Some(value));
        }

        let guard = Arc::clone(
            self.in_flight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        );
        let _permit = guard.lock().await;

        // A concurrent waiter may have already populated (B) while this
        // task waited for the single-flight guard.
        if let Some(value) = self.local.get(key) {
            self.monitor.record_cache_hit(&self.cache_name);
            self.in_flight.remove_if(key, |_, g| Arc::ptr_eq(g, &guard));
            return Ok(Some(value));
        }

        let result = match self.remote.get(key).await {
            Ok(Some(value)) => {
                self.local.set(key, value.clone(), ttl_hint);
                self.monitor.record_cache_hit(&self.cache_name);
                Some(value)
            }
            Ok(None) => {
                self.monitor.record_cache_miss(&self.cache_name);
                None
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "remote cache unavailable, degrading to local-only");
                self.monitor.record_suppressed_error("multi_tier_cache");
                self.monitor.record_cache_miss(&self.cache_name);
                None
            }
        };

        self.in_flight.remove_if(key, |_, g| Arc::ptr_eq(g, &guard));
        Ok(result)
    }

    /// Write-through: (C) first; (B) is only populated once (C) has
    /// durably accepted the write, so (B) never holds data the remote tier
    /// does not also have (`spec.md` §4.4 Write path).
    ///
    /// # Errors
    ///
    /// Propagates the remote-store error so the warming controller can
    /// retry; writes are fail-closed.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> ChronoResult<()> {
        self.remote.set(key, value.clone(), ttl).await?;
        self.local.set(key, value, ttl);
        Ok(())
    }

    /// Invalidate a single key in both tiers.
    ///
    /// # Errors
    ///
    /// Propagates a remote deletion failure after still invalidating the
    /// local tier, per the documented brief-inconsistency window
    /// (`spec.md` §4.4 Invalidate path).
    pub async fn invalidate(&self, key: &str) -> ChronoResult<()> {
        let result = self.remote.delete(key).await;
        self.local.delete(key);
        result
    }

    /// Invalidate every key matching a glob `pattern` in both tiers.
    ///
    /// # Errors
    ///
    /// Propagates a remote pattern-deletion failure. The local tier is
    /// still scrubbed of any key that matches the same glob.
    pub async fn invalidate_pattern(&self, pattern: &str) -> ChronoResult<u64> {
        let result = self.remote.delete_pattern(pattern).await;
        if let Some(matcher) = glob_to_matcher(pattern) {
            self.local.delete_matching(|k| matcher(k));
        }
        result
    }

    /// Whether `key` exists in either tier, checking (B) first.
    #[must_use]
    pub async fn exists(&self, key: &str) -> bool {
        if self.local.exists(key) {
            return true;
        }
        self.remote.exists(key).await.unwrap_or(false)
    }

    /// This cache's logical name, as recorded in the performance monitor.
    #[must_use]
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// The underlying in-process tier, for warming/admin paths that need
    /// direct access.
    #[must_use]
    pub fn local(&self) -> &SharedLocalCache {
        &self.local
    }

    /// The underlying remote tier, for health checks.
    #[must_use]
    pub fn remote(&self) -> &Arc<dyn RemoteCachePort> {
        &self.remote
    }
}

/// Compile a `*`/`?` glob into a simple matcher closure, used only to keep
/// the local tier's pattern-delete in sync with the remote's `SCAN MATCH`
/// semantics. Returns `None` for patterns containing unsupported
/// metacharacters, in which case local-tier scrubbing is skipped (the
/// remote tier remains authoritative and will still expire the entry).
fn glob_to_matcher(pattern: &str) -> Option<impl Fn(&str) -> bool + use<>> {
    let mut regex_str = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => regex_str.push_str(".*"),
            '?' => regex_str.push('.'),
            c if regex::escape(&c.to_string()) != c.to_string() => {
                regex_str.push_str(&regex::escape(&c.to_string()));
            }
            c => regex_str.push(c),
        }
    }
    regex_str.push('$');
    let re = regex::Regex::new(&regex_str).ok()?;
    Some(move |s: &str| re.is_match(s))
}
