//! Cache Warming Controller (E) — scheduled full warm, incremental warm,
//! force-refresh, and stale-refresh of the multi-tier cache from upstream
//! data providers (`spec.md` §4.5).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use super::multi_tier::MultiTierCache;
use crate::error::{ChronoError, ChronoResult};

/// An upstream data source the warming controller fetches fresh values
/// from. Object-safe so the controller can hold a trait object and swap
/// providers per namespace.
#[async_trait]
pub trait DataProviderPort: Send + Sync {
    /// Fetch the current value for `id` within `namespace`, or `None` if
    /// the upstream has nothing for it.
    async fn fetch(&self, namespace: &str, id: &str) -> ChronoResult<Option<Vec<u8>>>;

    /// List every id the provider currently knows about for `namespace`,
    /// used by a scheduled full warm.
    async fn list_ids(&self, namespace: &str) -> ChronoResult<Vec<String>>;
}

/// Deterministic in-memory provider used by tests and as a safe default
/// when no upstream URL is configured.
#[derive(Debug, Default)]
pub struct MockDataProvider {
    data: DashMap<(String, String), Vec<u8>>,
}

impl MockDataProvider {
    /// Build an empty mock provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value the provider will return for `(namespace, id)`.
    pub fn seed(&self, namespace: &str, id: &str, value: Vec<u8>) {
        self.data
            .insert((namespace.to_string(), id.to_string()), value);
    }
}

#[async_trait]
impl DataProviderPort for MockDataProvider {
    async fn fetch(&self, namespace: &str, id: &str) -> ChronoResult<Option<Vec<u8>>> {
        Ok(self
            .data
            .get(&(namespace.to_string(), id.to_string()))
            .map(|v| v.clone()))
    }

    async fn list_ids(&self, namespace: &str) -> ChronoResult<Vec<String>> {
        Ok(self
            .data
            .iter()
            .filter(|entry| entry.key().0 == namespace)
            .map(|entry| entry.key().1.clone())
            .collect())
    }
}

/// HTTP-backed provider fetching from a configured upstream base URL, used
/// when a real data source is wired in place of the mock.
pub struct HttpDataProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDataProvider {
    /// Build a provider issuing `GET {base_url}/{namespace}/{id}` requests.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl DataProviderPort for HttpDataProvider {
    async fn fetch(&self, namespace: &str, id: &str) -> ChronoResult<Option<Vec<u8>>> {
        let url = format!("{}/{namespace}/{id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChronoError::unavailable(format!("provider request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = response
            .error_for_status()
            .map_err(|e| ChronoError::unavailable(format!("provider returned error: {e}")))?
            .bytes()
            .await
            .map_err(|e| ChronoError::unavailable(format!("provider body read failed: {e}")))?;
        Ok(Some(bytes.to_vec()))
    }

    async fn list_ids(&self, namespace: &str) -> ChronoResult<Vec<String>> {
        let url = format!("{}/{namespace}", self.base_url);
        let ids: Vec<String> = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChronoError::unavailable(format!("provider request failed: {e}")))?
            .error_for_status()
            .map_err(|e| ChronoError::unavailable(format!("provider returned error: {e}")))?
            .json()
            .await
            .map_err(|e| ChronoError::unavailable(format!("provider body decode failed: {e}")))?;
        Ok(ids)
    }
}

/// Outcome of a single warm run, either scheduled or ad-hoc.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    /// Items successfully fetched and written through to the cache.
    pub succeeded: u64,
    /// Items skipped after a provider or cache-write failure.
    pub failed: u64,
}

impl RunStats {
    fn failure_ratio(self) -> f64 {
        let total = self.succeeded + self.failed;
        if total == 0 {
            0.0
        } else {
            self.failed as f64 / total as f64
        }
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Cumulative, atomically-updated warming statistics queried by `stats()`.
#[derive(Debug, Default)]
pub struct WarmingStats {
    total_succeeded: AtomicU64,
    total_failed: AtomicU64,
    runs_completed: AtomicU64,
    last_run_failed: AtomicU64,
    last_run_total: AtomicU64,
    last_run_at: AtomicU64,
}

impl WarmingStats {
    fn record(&self, run: RunStats) {
        self.total_succeeded.fetch_add(run.succeeded, Ordering::Relaxed);
        self.total_failed.fetch_add(run.failed, Ordering::Relaxed);
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.last_run_failed.store(run.failed, Ordering::Relaxed);
        self.last_run_total
            .store(run.succeeded + run.failed, Ordering::Relaxed);
        self.last_run_at.store(now_millis() as u64, Ordering::Relaxed);
    }

    /// Snapshot of cumulative success/failure counts and the number of
    /// completed runs.
    #[must_use]
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.total_succeeded.load(Ordering::Relaxed),
            self.total_failed.load(Ordering::Relaxed),
            self.runs_completed.load(Ordering::Relaxed),
        )
    }

    /// Epoch milliseconds of the most recently completed run, or `None` if
    /// no run has completed yet.
    #[must_use]
    pub fn last_run_at(&self) -> Option<i64> {
        let stamp = self.last_run_at.load(Ordering::Relaxed);
        (stamp != 0).then_some(stamp as i64)
    }

    fn last_run_failure_ratio(&self) -> f64 {
        let total = self.last_run_total.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            self.last_run_failed.load(Ordering::Relaxed) as f64 / total as f64
        }
    }
}

/// One namespace the controller knows how to warm: its provider, TTL, and
/// ids tracked for incremental/stale refresh.
struct Namespace {
    provider: Arc<dyn DataProviderPort>,
    ttl: Duration,
}

/// Scheduled and on-demand cache population from upstream providers
/// (`spec.md` §4.5).
///
/// Concurrent warms for the same namespace are serialized via a
/// single-flight guard keyed on the namespace name; per-item failures are
/// counted and skipped rather than aborting the run.
pub struct WarmingController {
    cache: Arc<MultiTierCache>,
    namespaces: DashMap<String, Namespace>,
    in_flight: DashMap<String, Arc<AsyncMutex<()>>>,
    stats: WarmingStats,
    degraded_threshold: f64,
    degraded: AtomicBool,
    /// Epoch milliseconds a cache key was last successfully written
    /// through, consulted by [`Self::stale_refresh`] to decide which ids
    /// have actually aged past the threshold (`spec.md` §4.5(d)).
    last_written: DashMap<String, i64>,
}

impl WarmingController {
    /// Build a controller writing through `cache`, flagging itself
    /// degraded when a run's failure ratio exceeds `degraded_threshold`
    /// (`spec.md` §4.5 Failure policy).
    #[must_use]
    pub fn new(cache: Arc<MultiTierCache>, degraded_threshold: f64) -> Self {
        Self {
            cache,
            namespaces: DashMap::new(),
            in_flight: DashMap::new(),
            stats: WarmingStats::default(),
            degraded_threshold,
            degraded: AtomicBool::new(false),
            last_written: DashMap::new(),
        }
    }

    /// Register a namespace this controller is responsible for warming.
    pub fn register_namespace(
        &self,
        namespace: impl Into<String>,
        provider: Arc<dyn DataProviderPort>,
        ttl: Duration,
    ) {
        self.namespaces
            .insert(namespace.into(), Namespace { provider, ttl });
    }

    /// Scheduled full warm: fetches every id the namespace's provider
    /// currently lists and writes it through the cache.
    ///
    /// # Errors
    ///
    /// Fails only if `namespace` is unregistered; per-item fetch/write
    /// failures are counted, not propagated.
    pub async fn warm_namespace(&self, namespace: &str) -> ChronoResult<RunStats> {
        let ids = {
            let entry = self
                .namespaces
                .get(namespace)
                .ok_or_else(|| ChronoError::not_found("warming namespace", namespace))?;
            entry.provider.list_ids(namespace).await.unwrap_or_default()
        };
        self.warm_ids(namespace, &ids, false).await
    }

    /// Incremental warm of an explicit id list, skipping ids already
    /// cached unless `force` bypasses the read-through check.
    ///
    /// # Errors
    ///
    /// Fails only if `namespace` is unregistered.
    pub async fn warm_ids(
        &self,
        namespace: &str,
        ids: &[String],
        force: bool,
    ) -> ChronoResult<RunStats> {
        let guard = Arc::clone(
            self.in_flight
                .entry(namespace.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        );
        let _permit = guard.lock().await;

        let (provider, ttl) = {
            let entry = self
                .namespaces
                .get(namespace)
                .ok_or_else(|| ChronoError::not_found("warming namespace", namespace))?;
            (Arc::clone(&entry.provider), entry.ttl)
        };

        let mut run = RunStats::default();
        for id in ids {
            let cache_key = super::key::key(namespace, id, &[]);

            if !force && self.cache.exists(&cache_key).await {
                continue;
            }

            match provider.fetch(namespace, id).await {
                Ok(Some(value)) => match self.cache.set(&cache_key, value, ttl).await {
                    Ok(()) => {
                        self.last_written.insert(cache_key.clone(), now_millis());
                        run.succeeded += 1;
                    }
                    Err(err) => {
                        tracing::warn!(namespace, id, error = %err, "warm write-through failed");
                        run.failed += 1;
                    }
                },
                Ok(None) => {
                    tracing::debug!(namespace, id, "provider has no data for id");
                    run.failed += 1;
                }
                Err(err) => {
                    tracing::warn!(namespace, id, error = %err, "warm fetch failed");
                    run.failed += 1;
                }
            }
        }

        self.in_flight
            .remove_if(namespace, |_, g| Arc::ptr_eq(g, &guard));
        self.stats.record(run);
        self.degraded.store(
            run.failure_ratio() > self.degraded_threshold,
            Ordering::Relaxed,
        );
        Ok(run)
    }

    /// Force-refresh: re-fetches and overwrites every id in `ids`
    /// regardless of current cache state (`spec.md` §4.5(c)).
    ///
    /// # Errors
    ///
    /// Fails only if `namespace` is unregistered.
    pub async fn force_refresh(
        &self,
        namespace: &str,
        ids: &[String],
    ) -> ChronoResult<RunStats> {
        self.warm_ids(namespace, ids, true).await
    }

    /// Stale-refresh: re-warms every id in `ids` whose tracked
    /// `last_written_at` is absent or older than `stale_threshold`,
    /// skipping ids still within the threshold (`spec.md` §4.5(d)).
    ///
    /// Only ids that are actually stale are force-refreshed; an id that was
    /// written recently enough is left untouched rather than re-fetched.
    ///
    /// # Errors
    ///
    /// Fails only if `namespace` is unregistered.
    pub async fn stale_refresh(
        &self,
        namespace: &str,
        ids: &[String],
        stale_threshold: Duration,
    ) -> ChronoResult<RunStats> {
        let threshold_ms = i64::try_from(stale_threshold.as_millis()).unwrap_or(i64::MAX);
        let now = now_millis();
        let stale_ids: Vec<String> = ids
            .iter()
            .filter(|id| {
                let cache_key = super::key::key(namespace, id, &[]);
                match self.last_written.get(&cache_key) {
                    Some(written_at) => now - *written_at >= threshold_ms,
                    None => true,
                }
            })
            .cloned()
            .collect();
        self.warm_ids(namespace, &stale_ids, true).await
    }

    /// Stale-refresh every id the namespace's provider currently lists,
    /// the whole-namespace counterpart to [`Self::warm_namespace`] for
    /// responsibility (d) in `spec.md` §4.5.
    ///
    /// # Errors
    ///
    /// Fails only if `namespace` is unregistered.
    pub async fn stale_refresh_namespace(
        &self,
        namespace: &str,
        stale_threshold: Duration,
    ) -> ChronoResult<RunStats> {
        let ids = {
            let entry = self
                .namespaces
                .get(namespace)
                .ok_or_else(|| ChronoError::not_found("warming namespace", namespace))?;
            entry.provider.list_ids(namespace).await.unwrap_or_default()
        };
        self.stale_refresh(namespace, &ids, stale_threshold).await
    }

    /// Cumulative success/failure/run-count statistics since startup.
    #[must_use]
    pub fn stats(&self) -> (u64, u64, u64) {
        self.stats.snapshot()
    }

    /// Epoch milliseconds of the most recently completed warm run.
    #[must_use]
    pub fn last_run_at(&self) -> Option<i64> {
        self.stats.last_run_at()
    }

    /// Whether the controller considers itself healthy: the most recent
    /// run's failure ratio did not exceed the configured threshold.
    #[must_use]
    pub fn healthy(&self) -> bool {
        !self.degraded.load(Ordering::Relaxed)
            && self.stats.last_run_failure_ratio() <= self.degraded_threshold
    }

    /// Spawn the periodic scheduled-warm background task, warming every
    /// registered namespace on each tick until `shutdown` fires.
    pub fn spawn_scheduler(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let namespaces: Vec<String> = controller
                            .namespaces
                            .iter()
                            .map(|entry| entry.key().clone())
                            .collect();
                        for namespace in namespaces {
                            if let Err(err) = controller.warm_namespace(&namespace).await {
                                tracing::warn!(namespace, error = %err, "scheduled warm failed");
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }
}

/// Per-namespace health summary for the `/cache/health` endpoint.
#[derive(Debug, Clone, Copy)]
pub struct HealthSummary {
    /// Total successful warm operations since startup.
    pub total_succeeded: u64,
    /// Total failed warm operations since startup.
    pub total_failed: u64,
    /// Number of completed warm runs since startup.
    pub runs_completed: u64,
    /// Whether the controller currently reports itself healthy.
    pub healthy: bool,
}

impl WarmingController {
    /// Build a [`HealthSummary`] from the controller's current state.
    #[must_use]
    pub fn health_summary(&self) -> HealthSummary {
        let (total_succeeded, total_failed, runs_completed) = self.stats();
        HealthSummary {
            total_succeeded,
            total_failed,
            runs_completed,
            healthy: self.healthy(),
        }
    }
}
