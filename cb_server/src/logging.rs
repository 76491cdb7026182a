//! Structured logging configuration.
//!
//! The bracket engine logs through the `log` facade; the subscriber installed
//! here also captures those records, so engine and HTTP events share one
//! output stream and one `RUST_LOG` filter.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or unparsable
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn";

/// Initialize structured logging
///
/// # Example
///
/// ```no_run
/// use cb_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log a bracket state change with structured fields
pub fn log_bracket_event(event: &str, tournament_id: i64, detail: &str) {
    tracing::info!(event = event, tournament_id = tournament_id, "{}", detail);
}

/// Log a storage operation that exceeded `threshold_ms`
pub fn log_slow_operation(operation: &str, duration_ms: u64, threshold_ms: u64) {
    if duration_ms > threshold_ms {
        tracing::warn!(
            operation = operation,
            duration_ms = duration_ms,
            threshold_ms = threshold_ms,
            "Slow operation detected"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_logging_helpers_without_subscriber() {
        log_bracket_event("bracket_generated", 1, "8 players, 3 rounds");
        log_slow_operation("report_result", 20, 100);
        log_slow_operation("report_result", 250, 100);
    }
}
