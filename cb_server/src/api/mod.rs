//! HTTP API for the bracket engine.
//!
//! # Endpoints
//!
//! ```text
//! GET  /health                                    - Storage health
//! GET  /api/v1/tournaments/{id}/bracket/check     - Can a bracket be generated
//! POST /api/v1/tournaments/{id}/bracket           - Generate (or regenerate) the bracket
//! GET  /api/v1/tournaments/{id}/bracket           - Display view, grouped by round
//! GET  /api/v1/tournaments/{id}/bracket/verify    - Structure report
//! GET  /api/v1/tournaments/{id}/matches/pending   - Matches ready to be played
//! POST /api/v1/tournaments/{id}/finalize          - Compute and award standings
//! GET  /api/v1/tournaments/{id}/results           - Stored standings
//! POST /api/v1/matches/{id}/start                 - Mark a match in progress
//! POST /api/v1/matches/{id}/result                - Report a result and advance
//! POST /api/v1/matches/{id}/advance               - Re-run advancement for a completed match
//! ```
//!
//! Successful responses are `{"success": true, "data": ...}`; failures are
//! described in [`errors`].

pub mod brackets;
pub mod errors;
pub mod matches;
pub mod request_id;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use club_bracket::BracketManager;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub use errors::{ApiError, ErrorResponse};

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<BracketManager>,
}

/// Success envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Result type for handlers
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Create the complete API router with all endpoints and middleware.
///
/// # Example
///
/// ```rust,no_run
/// # use cb_server::api::{create_router, AppState};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let state: AppState = unimplemented!();
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", create_v1_router())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn create_v1_router() -> Router<AppState> {
    let tournament_routes = Router::new()
        .route(
            "/tournaments/{tournament_id}/bracket",
            get(brackets::get_bracket).post(brackets::generate_bracket),
        )
        .route(
            "/tournaments/{tournament_id}/bracket/check",
            get(brackets::check_generation),
        )
        .route(
            "/tournaments/{tournament_id}/bracket/verify",
            get(brackets::verify_bracket),
        )
        .route(
            "/tournaments/{tournament_id}/matches/pending",
            get(brackets::pending_matches),
        )
        .route(
            "/tournaments/{tournament_id}/finalize",
            post(brackets::finalize_tournament),
        )
        .route(
            "/tournaments/{tournament_id}/results",
            get(brackets::get_results),
        );

    let match_routes = Router::new()
        .route("/matches/{match_id}/start", post(matches::start_match))
        .route("/matches/{match_id}/result", post(matches::report_result))
        .route("/matches/{match_id}/advance", post(matches::advance_winner));

    Router::new().merge(tournament_routes).merge(match_routes)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when storage answers, `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","version":"1.0.0","database":true,"timestamp":"2026-10-16T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = match state.manager.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            false
        }
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
