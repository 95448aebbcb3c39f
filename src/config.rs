//! Configuration loading, interpolation, and validation.
//!
//! Mirrors the teacher's layered YAML + environment-variable interpolation
//! approach: a single YAML document, `${VAR}` / `${VAR:-default}` expansion,
//! then structural validation before the rest of the process touches it.

use serde::{Deserialize, Serialize};
use serde_yaml_bw as serde_yaml;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        /// Path that failed to read.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse the YAML document.
    #[error("failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A structural validation rule failed.
    #[error("config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure for the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP/WebSocket server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// In-process cache (tier B) configuration.
    #[serde(default)]
    pub local_cache: LocalCacheConfig,
    /// Remote cache (tier C) configuration.
    #[serde(default)]
    pub remote_cache: RemoteCacheConfig,
    /// Cache warming controller configuration.
    #[serde(default)]
    pub warming: WarmingConfig,
    /// Real-time connection manager configuration.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Performance monitor configuration.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Observability (logging/metrics) configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            local_cache: LocalCacheConfig::default(),
            remote_cache: RemoteCacheConfig::default(),
            warming: WarmingConfig::default(),
            realtime: RealtimeConfig::default(),
            monitor: MonitorConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// HTTP/WebSocket server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP/WebSocket server.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Listen port.
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_http_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}

/// In-process cache (tier B) configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LocalCacheConfig {
    /// Maximum number of entries held in the in-process LRU.
    #[serde(default = "default_local_capacity")]
    pub capacity: u64,
    /// Default TTL (seconds) applied when a caller does not specify one.
    #[serde(default = "default_local_ttl_secs")]
    pub default_ttl_secs: u64,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_local_capacity(),
            default_ttl_secs: default_local_ttl_secs(),
        }
    }
}

fn default_local_capacity() -> u64 {
    10_000
}
fn default_local_ttl_secs() -> u64 {
    300
}

/// Remote cache (tier C) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCacheConfig {
    /// Connection URL for the remote key/value store.
    #[serde(default = "default_remote_url")]
    pub url: String,
    /// Per-call deadline in milliseconds; on timeout, reads degrade to a miss.
    #[serde(default = "default_remote_deadline_ms")]
    pub deadline_ms: u64,
}

impl Default for RemoteCacheConfig {
    fn default() -> Self {
        Self {
            url: default_remote_url(),
            deadline_ms: default_remote_deadline_ms(),
        }
    }
}

fn default_remote_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_remote_deadline_ms() -> u64 {
    50
}

/// Cache warming controller configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WarmingConfig {
    /// Interval (seconds) between scheduled full warm runs.
    #[serde(default = "default_warm_interval_secs")]
    pub scheduled_interval_secs: u64,
    /// Age (seconds) beyond which an entry is eligible for stale-refresh.
    #[serde(default = "default_stale_threshold_secs")]
    pub stale_threshold_secs: u64,
    /// Failure ratio within a run above which `healthy()` reports degraded.
    #[serde(default = "default_degraded_failure_ratio")]
    pub degraded_failure_ratio: f64,
    /// Maximum ad-hoc warm tasks running concurrently.
    #[serde(default = "default_warm_worker_pool")]
    pub worker_pool_size: usize,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            scheduled_interval_secs: default_warm_interval_secs(),
            stale_threshold_secs: default_stale_threshold_secs(),
            degraded_failure_ratio: default_degraded_failure_ratio(),
            worker_pool_size: default_warm_worker_pool(),
        }
    }
}

fn default_warm_interval_secs() -> u64 {
    900
}
fn default_stale_threshold_secs() -> u64 {
    3600
}
fn default_degraded_failure_ratio() -> f64 {
    0.3
}
fn default_warm_worker_pool() -> usize {
    4
}

/// Real-time connection manager configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Heartbeat ping interval in seconds.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// A session idle (no pong) longer than this is disconnected.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Bounded outbound queue depth per session.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
        }
    }
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}
fn default_idle_timeout_secs() -> u64 {
    90
}
fn default_outbound_queue_capacity() -> usize {
    256
}

/// Performance monitor configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval (seconds) between host metric samples.
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,
    /// Number of host samples retained in the ring buffer.
    #[serde(default = "default_sample_ring_capacity")]
    pub sample_ring_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval_secs(),
            sample_ring_capacity: default_sample_ring_capacity(),
        }
    }
}

fn default_sample_interval_secs() -> u64 {
    10
}
fn default_sample_ring_capacity() -> usize {
    360
}

/// Observability (logging/metrics) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `tracing-subscriber` env-filter directive string.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Address the Prometheus metrics exporter listens on.
    #[serde(default = "default_metrics_addr")]
    pub metrics_listen_addr: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            metrics_listen_addr: default_metrics_addr(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

// ============================================
// Loading
// ============================================

/// Load configuration from a YAML file with environment variable
/// interpolation.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or
/// validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;
    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for tests).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate `${VAR}` and `${VAR:-default}` references against the process
/// environment.
fn interpolate_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("static regex is valid");

    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let var_name = &caps[1];
        let default_value = caps.get(2).map(|m| m.as_str());
        match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.unwrap_or_default().to_string(),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.local_cache.capacity == 0 {
        return Err(ConfigError::ValidationError(
            "local_cache.capacity must be positive".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&config.warming.degraded_failure_ratio) {
        return Err(ConfigError::ValidationError(
            "warming.degraded_failure_ratio must be between 0.0 and 1.0".to_string(),
        ));
    }
    if config.warming.worker_pool_size == 0 {
        return Err(ConfigError::ValidationError(
            "warming.worker_pool_size must be positive".to_string(),
        ));
    }
    if config.realtime.outbound_queue_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "realtime.outbound_queue_capacity must be positive".to_string(),
        ));
    }
    if config.realtime.idle_timeout_secs <= config.realtime.heartbeat_interval_secs {
        return Err(ConfigError::ValidationError(
            "realtime.idle_timeout_secs must exceed heartbeat_interval_secs".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn interpolates_env_with_default() {
        // SAFETY: test runs single-threaded w.r.t. this var.
        unsafe {
            std::env::remove_var("CHRONO_TEST_VAR");
        }
        let out = interpolate_env_vars("value: ${CHRONO_TEST_VAR:-fallback}");
        assert_eq!(out, "value: fallback");
    }

    #[test]
    fn interpolates_env_when_set() {
        // SAFETY: test runs single-threaded w.r.t. this var.
        unsafe {
            std::env::set_var("CHRONO_TEST_VAR2", "overridden");
        }
        let out = interpolate_env_vars("value: ${CHRONO_TEST_VAR2:-fallback}");
        assert_eq!(out, "value: overridden");
    }

    #[test]
    fn rejects_bad_failure_ratio() {
        let yaml = "warming:\n  degraded_failure_ratio: 2.0\n";
        let err = load_config_from_string(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn rejects_idle_timeout_not_exceeding_heartbeat() {
        let yaml = "realtime:\n  heartbeat_interval_secs: 60\n  idle_timeout_secs: 30\n";
        let err = load_config_from_string(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn loads_full_document() {
        let yaml = r"
server:
  bind_address: 127.0.0.1
  port: 9999
local_cache:
  capacity: 500
  default_ttl_secs: 60
";
        let config = load_config_from_string(yaml).unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.local_cache.capacity, 500);
    }
}
