//! Prometheus metrics for the bracket server.
//!
//! Metrics are exposed in Prometheus text format on a separate listener
//! (`METRICS_BIND`). Without an installed exporter every call here is a no-op.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

/// Increment API error counter by error code.
pub fn api_errors_total(code: &'static str) {
    metrics::counter!("api_errors_total", "code" => code).increment(1);
}

// ============================================================================
// Bracket Metrics
// ============================================================================

/// Increment generated brackets counter.
pub fn brackets_generated_total(regenerated: bool) {
    metrics::counter!("brackets_generated_total",
        "regenerated" => regenerated.to_string()
    )
    .increment(1);
}

/// Record bracket size distribution.
pub fn bracket_size(size: u32) {
    metrics::histogram!("bracket_size").record(size as f64);
}

/// Increment reported match results counter.
pub fn match_results_total() {
    metrics::counter!("match_results_total").increment(1);
}

/// Increment concurrent-write conflicts counter.
pub fn advancement_conflicts_total() {
    metrics::counter!("advancement_conflicts_total").increment(1);
}

/// Increment finalized tournaments counter.
///
/// Repeat finalizations that returned stored standings are labelled separately.
pub fn tournaments_finalized_total(already_finalized: bool) {
    metrics::counter!("tournaments_finalized_total",
        "already_finalized" => already_finalized.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter_is_noop() {
        http_requests_total("GET", "/health", 200);
        http_request_duration_ms("GET", "/health", 1.5);
        api_errors_total("advancement_conflict");
        brackets_generated_total(false);
        bracket_size(16);
        match_results_total();
        advancement_conflicts_total();
        tournaments_finalized_total(true);
    }
}
