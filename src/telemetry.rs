//! Structured logging setup.
//!
//! Initializes a `tracing-subscriber` console formatter driven by the
//! configured env-filter directive. The teacher's telemetry module also wires
//! an OTLP exporter; this service is single-process and the Performance
//! Monitor's Prometheus exporter already covers metrics export, so only the
//! console layer is kept (see `DESIGN.md`).

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `filter_directive` is an `EnvFilter` directive string (e.g. `"info"` or
/// `"chronoretrace_core=debug,tower_http=info"`), normally sourced from
/// [`crate::config::ObservabilityConfig::log_filter`]. `RUST_LOG`, when set,
/// takes precedence.
///
/// # Panics
///
/// Panics if a global subscriber has already been installed.
pub fn init_telemetry(filter_directive: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive.to_string()));

    let is_development = std::env::var("ENVIRONMENT")
        .map(|v| v.eq_ignore_ascii_case("development"))
        .unwrap_or(false);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(!is_development)
        .with_ansi(is_development)
        .init();

    tracing::info!("telemetry initialized");
}
