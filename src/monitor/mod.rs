//! Performance Monitor (F) — cache hit/miss counters, per-endpoint request
//! histograms, and periodic host metrics (`spec.md` §4.6).
//!
//! All recording operations are lock-light (atomics plus a sharded
//! `DashMap`) and never panic; under contention they may coalesce detail but
//! never raise, per the spec's "lock-light … must not throw" contract.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::error::{ChronoError, ChronoResult};

/// Install the process-wide Prometheus recorder and start its `/metrics`
/// HTTP listener on `listen_addr`, so the `counter!`/`gauge!` calls this
/// module makes land in a real recorder instead of the metrics crate's
/// no-op default (`spec.md` §4.6).
///
/// # Errors
///
/// Returns `unavailable` if `listen_addr` does not parse as a socket
/// address, or if a recorder is already installed (e.g. a second call).
pub fn init_metrics(listen_addr: &str) -> ChronoResult<()> {
    let addr: std::net::SocketAddr = listen_addr
        .parse()
        .map_err(|e| ChronoError::unavailable(format!("invalid metrics listen address: {e}")))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ChronoError::unavailable(format!("failed to install metrics exporter: {e}")))?;
    tracing::info!(%addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Per-cache-name hit/miss counters.
#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Snapshot of one logical cache's hit/miss statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    /// Hits recorded.
    pub hits: u64,
    /// Misses recorded.
    pub misses: u64,
}

impl CacheStatsSnapshot {
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

    /// Miss rate, the complement of [`hit_rate`](Self::hit_rate).
    #[must_use]
    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }
}

/// Aggregated per-endpoint request statistics.
#[derive(Debug, Default)]
struct ApiCounters {
    total: AtomicU64,
    success: AtomicU64,
    error: AtomicU64,
    /// EWMA of response time in milliseconds, stored as bits for atomic
    /// access (`spec.md` §4.6 permits either EWMA or fixed window).
    mean_ms_bits: AtomicU64,
}

const EWMA_ALPHA: f64 = 0.2;

/// Snapshot of one endpoint's request metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMetricSnapshot {
    /// HTTP method.
    pub method: String,
    /// Route path (template, not the raw URL).
    pub path: String,
    /// Total requests observed.
    pub total: u64,
    /// Requests that completed with a non-error status.
    pub success: u64,
    /// Requests that completed with an error status.
    pub error: u64,
    /// Exponentially-weighted mean response time, milliseconds.
    pub mean_response_ms: f64,
}

/// One periodic host resource sample (`spec.md` §4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HostSample {
    /// Unix timestamp (seconds) the sample was taken.
    pub timestamp: i64,
    /// CPU utilization, percent.
    pub cpu_percent: f64,
    /// Memory utilization, percent.
    pub memory_percent: f64,
    /// Coarse "disk pressure" proxy: used/total memory of swap as percent,
    /// since the crate's sandboxed deployment target does not guarantee a
    /// mounted data volume to statfs.
    pub disk_percent: f64,
}

/// Queryable summary returned by [`PerformanceMonitor::system_metrics`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct SystemMetricsSummary {
    /// Most recent sample, if any has been taken yet.
    pub latest: Option<HostSample>,
}

/// Aggregates cache, API, and host metrics; mirrors counters into the
/// process-wide Prometheus exporter while keeping its own bounded,
/// queryable summaries (`spec.md` §4.6).
pub struct PerformanceMonitor {
    cache_counters: DashMap<String, CacheCounters>,
    api_counters: DashMap<(String, String), ApiCounters>,
    host_samples: RwLock<VecDeque<HostSample>>,
    sample_ring_capacity: usize,
    suppressed_errors: AtomicU64,
}

impl PerformanceMonitor {
    /// Build a monitor retaining up to `sample_ring_capacity` host samples.
    #[must_use]
    pub fn new(sample_ring_capacity: usize) -> Self {
        Self {
            cache_counters: DashMap::new(),
            api_counters: DashMap::new(),
            host_samples: RwLock::new(VecDeque::with_capacity(sample_ring_capacity)),
            sample_ring_capacity: sample_ring_capacity.max(1),
            suppressed_errors: AtomicU64::new(0),
        }
    }

    /// Record a cache hit for the logical cache named `name`.
    pub fn record_cache_hit(&self, name: &str) {
        self.cache_counters
            .entry(name.to_string())
            .or_default()
            .hits
            .fetch_add(1, Ordering::Relaxed);
        counter!("cache_hits_total", "cache" => name.to_string()).increment(1);
    }

    /// Record a cache miss for the logical cache named `name`.
    pub fn record_cache_miss(&self, name: &str) {
        self.cache_counters
            .entry(name.to_string())
            .or_default()
            .misses
            .fetch_add(1, Ordering::Relaxed);
        counter!("cache_misses_total", "cache" => name.to_string()).increment(1);
    }

    /// Snapshot hit/miss statistics for every logical cache observed so far.
    #[must_use]
    pub fn cache_stats(&self) -> std::collections::HashMap<String, CacheStatsSnapshot> {
        self.cache_counters
            .iter()
            .map(|entry| {
                let counters = entry.value();
                (
                    entry.key().clone(),
                    CacheStatsSnapshot {
                        hits: counters.hits.load(Ordering::Relaxed),
                        misses: counters.misses.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }

    /// Record one completed request against `(method, path)`.
    pub fn record_api_request(&self, method: &str, path: &str, is_error: bool, latency: Duration) {
        let key = (method.to_string(), path.to_string());
        let entry = self.api_counters.entry(key).or_default();
        entry.total.fetch_add(1, Ordering::Relaxed);
        if is_error {
            entry.error.fetch_add(1, Ordering::Relaxed);
        } else {
            entry.success.fetch_add(1, Ordering::Relaxed);
        }

        let sample_ms = latency.as_secs_f64() * 1000.0;
        let prev_bits = entry.mean_ms_bits.load(Ordering::Relaxed);
        let prev = f64::from_bits(prev_bits);
        let next = if prev_bits == 0 {
            sample_ms
        } else {
            EWMA_ALPHA.mul_add(sample_ms, (1.0 - EWMA_ALPHA) * prev)
        };
        entry.mean_ms_bits.store(next.to_bits(), Ordering::Relaxed);

        let status = if is_error { "error" } else { "success" };
        counter!(
            "api_requests_total",
            "method" => method.to_string(),
            "path" => path.to_string(),
            "status" => status
        )
        .increment(1);
    }

    /// Snapshot every observed endpoint's request metrics.
    #[must_use]
    pub fn api_metrics(&self) -> Vec<ApiMetricSnapshot> {
        self.api_counters
            .iter()
            .map(|entry| {
                let (method, path) = entry.key().clone();
                let counters = entry.value();
                ApiMetricSnapshot {
                    method,
                    path,
                    total: counters.total.load(Ordering::Relaxed),
                    success: counters.success.load(Ordering::Relaxed),
                    error: counters.error.load(Ordering::Relaxed),
                    mean_response_ms: f64::from_bits(
                        counters.mean_ms_bits.load(Ordering::Relaxed),
                    ),
                }
            })
            .collect()
    }

    /// Take one host resource sample and push it onto the bounded ring
    /// buffer, evicting the oldest sample if at capacity.
    pub fn sample_host(&self, sys: &mut System) {
        sys.refresh_all();

        let cpu_percent = f64::from(sys.global_cpu_usage());
        let total_mem = sys.total_memory().max(1);
        let memory_percent = (sys.used_memory() as f64 / total_mem as f64) * 100.0;
        let total_swap = sys.total_swap();
        let disk_percent = if total_swap == 0 {
            0.0
        } else {
            (sys.used_swap() as f64 / total_swap as f64) * 100.0
        };

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let sample = HostSample {
            timestamp,
            cpu_percent,
            memory_percent,
            disk_percent,
        };

        gauge!("host_cpu_percent").set(cpu_percent);
        gauge!("host_memory_percent").set(memory_percent);

        let mut ring = self.host_samples.write();
        if ring.len() >= self.sample_ring_capacity {
            ring.pop_front();
        }
        ring.push_back(sample);
    }

    /// Most recent host metrics sample, if any have been taken.
    #[must_use]
    pub fn system_metrics(&self) -> SystemMetricsSummary {
        SystemMetricsSummary {
            latest: self.host_samples.read().back().copied(),
        }
    }

    /// Host samples whose timestamp falls within `[t0, t1]` inclusive.
    #[must_use]
    pub fn metrics_in_range(&self, t0: i64, t1: i64) -> Vec<HostSample> {
        self.host_samples
            .read()
            .iter()
            .filter(|s| s.timestamp >= t0 && s.timestamp <= t1)
            .copied()
            .collect()
    }

    /// Increment the counter tracking errors that were suppressed rather
    /// than surfaced (`spec.md` §7: "every suppressed error increments a
    /// counter in (F)").
    pub fn record_suppressed_error(&self, component: &str) {
        self.suppressed_errors.fetch_add(1, Ordering::Relaxed);
        counter!("suppressed_errors_total", "component" => component.to_string()).increment(1);
    }

    /// Total suppressed-error count across all components.
    #[must_use]
    pub fn suppressed_error_count(&self) -> u64 {
        self.suppressed_errors.load(Ordering::Relaxed)
    }

    /// Spawn the periodic host-metrics sampler task, stopping when
    /// `shutdown` fires.
    pub fn spawn_sampler(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut sys = System::new_all();
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        monitor.sample_host(&mut sys);
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            tracing::info!("performance monitor sampler shutting down");
                            break;
                        }
                    }
                }
            }
        });
    }
}

/// Shared handle, cheap to clone across tasks.
pub type SharedMonitor = Arc<PerformanceMonitor>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_hit_rate_tracks_ratio() {
        let monitor = PerformanceMonitor::new(10);
        monitor.record_cache_hit("stock_data");
        monitor.record_cache_hit("stock_data");
        monitor.record_cache_miss("stock_data");

        let stats = monitor.cache_stats();
        let snap = stats.get("stock_data").unwrap();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert!((snap.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn api_metrics_track_success_and_error() {
        let monitor = PerformanceMonitor::new(10);
        monitor.record_api_request("GET", "/cache/stats", false, Duration::from_millis(5));
        monitor.record_api_request("GET", "/cache/stats", true, Duration::from_millis(15));

        let metrics = monitor.api_metrics();
        let entry = metrics
            .iter()
            .find(|m| m.path == "/cache/stats")
            .expect("recorded endpoint present");
        assert_eq!(entry.total, 2);
        assert_eq!(entry.success, 1);
        assert_eq!(entry.error, 1);
        assert!(entry.mean_response_ms > 0.0);
    }

    #[test]
    fn host_sample_ring_is_bounded() {
        let monitor = PerformanceMonitor::new(2);
        let mut sys = System::new_all();
        monitor.sample_host(&mut sys);
        monitor.sample_host(&mut sys);
        monitor.sample_host(&mut sys);
        assert_eq!(monitor.host_samples.read().len(), 2);
        assert!(monitor.system_metrics().latest.is_some());
    }

    #[test]
    fn suppressed_errors_accumulate() {
        let monitor = PerformanceMonitor::new(10);
        monitor.record_suppressed_error("warming");
        monitor.record_suppressed_error("warming");
        assert_eq!(monitor.suppressed_error_count(), 2);
    }

    #[test]
    fn metrics_in_range_filters_by_timestamp() {
        let monitor = PerformanceMonitor::new(10);
        let mut sys = System::new_all();
        monitor.sample_host(&mut sys);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let in_range = monitor.metrics_in_range(now - 60, now + 60);
        assert_eq!(in_range.len(), 1);
        let out_of_range = monitor.metrics_in_range(now + 1000, now + 2000);
        assert!(out_of_range.is_empty());
    }
}
