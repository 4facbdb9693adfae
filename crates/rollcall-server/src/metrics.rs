//! Prometheus metrics for the Rollcall server.
//!
//! This module provides:
//! - HTTP request metrics (count, latency)
//! - Read-through cache metrics (hits, misses, failed operations)
//! - Rate limiter rejections and SMS delivery outcomes

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_ERRORS_TOTAL: &str = "cache_errors_total";

    // Request accounting
    pub const RATE_LIMIT_REJECTIONS_TOTAL: &str = "rate_limit_rejections_total";

    // Notifications
    pub const SMS_SENT_TOTAL: &str = "sms_sent_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: /metrics renders the handle itself
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }
            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// =============================================================================
// HTTP Metrics
// =============================================================================

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let route = normalize_path(path);

    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "path" => route.clone(),
        "status" => status.to_string(),
        "status_class" => status_class(status)
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "path" => route
    )
    .record(duration.as_secs_f64());
}

/// Collapse path parameters so the `path` label stays low-cardinality.
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    match segments.as_slice() {
        ["", "students", _] => "/students/{code}".to_string(),
        ["", "stats", "endpoints", _] => "/stats/endpoints/{date}".to_string(),
        _ => path.to_string(),
    }
}

fn status_class(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

// =============================================================================
// Cache Metrics
// =============================================================================

pub fn record_cache_hit() {
    counter!(names::CACHE_HITS_TOTAL).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

/// Record a failed cache operation (`get`, `set`, `delete`, `scan`, ...).
pub fn record_cache_error(op: &'static str) {
    counter!(names::CACHE_ERRORS_TOTAL, "op" => op).increment(1);
}

// =============================================================================
// Request accounting and notifications
// =============================================================================

pub fn record_rate_limit_rejection(window: &'static str) {
    counter!(names::RATE_LIMIT_REJECTIONS_TOTAL, "window" => window).increment(1);
}

pub fn record_sms(provider: &'static str, outcome: &'static str) {
    counter!(
        names::SMS_SENT_TOTAL,
        "provider" => provider,
        "outcome" => outcome
    )
    .increment(1);
}
