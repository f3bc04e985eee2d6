//! Metrics definitions for the session gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gw_` prefix for the session gateway
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: fixed route list, everything else is `/other`
//! - `status`: 3 values (success, error, timeout)
//! - `outcome`: `success` or a `VerifyError` label
//! - `operation`: establish, teardown, status

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gw_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Verification includes a key set fetch on a cold cache
        .set_buckets_for_metric(
            Matcher::Prefix("gw_token_verification".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set token verification buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `gw_http_requests_total`, `gw_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("gw_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("gw_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path onto the fixed route list.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/api/session" => "/api/session",
        "/api/jwks-test" => "/api/jwks-test",
        "/api/me" => "/api/me",
        _ => "/other",
    }
}

// ============================================================================
// Verification Metrics
// ============================================================================

/// Record a single token verification.
///
/// Metric: `gw_token_verifications_total`, `gw_token_verification_duration_seconds`
/// Labels: `outcome`
pub fn record_token_verification(outcome: &'static str, duration: Duration) {
    histogram!("gw_token_verification_duration_seconds",
        "outcome" => outcome
    )
    .record(duration.as_secs_f64());

    counter!("gw_token_verifications_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Record one attempt made by the retry wrapper.
///
/// Metric: `gw_verify_attempts_total`
/// Labels: `result` (success, failure)
pub fn record_verify_attempt(result: &'static str) {
    counter!("gw_verify_attempts_total",
        "result" => result
    )
    .increment(1);
}

/// Record a key set fetch.
///
/// Metric: `gw_jwks_refresh_total`
/// Labels: `status` (success, error)
pub fn record_jwks_refresh(status: &'static str) {
    counter!("gw_jwks_refresh_total",
        "status" => status
    )
    .increment(1);
}

/// Record a key source probe run.
///
/// Metric: `gw_jwks_probe_total`
/// Labels: `summary` (success, all_failed)
pub fn record_key_probe(summary: &'static str) {
    counter!("gw_jwks_probe_total",
        "summary" => summary
    )
    .increment(1);
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Record a session operation.
///
/// Metric: `gw_session_operations_total`
/// Labels: `operation` (establish, teardown, status), `status`
pub fn record_session_operation(operation: &'static str, status: &'static str) {
    counter!("gw_session_operations_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}
