//! HTTP server for the club bracket engine.
//!
//! Exposes bracket generation, match reporting and standings over JSON, with
//! request-id correlated tracing and optional Prometheus metrics.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
