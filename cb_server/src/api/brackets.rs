//! Tournament-level bracket endpoints.
//!
//! Generate a bracket seeded by rating:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/tournaments/42/bracket \
//!   -H "Content-Type: application/json" \
//!   -d '{"seeding_method": "elo_ranking"}'
//! ```
//!
//! Regenerate over played matches:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/tournaments/42/bracket \
//!   -H "Content-Type: application/json" \
//!   -d '{"seeding_method": "random", "force_regenerate": true, "confirm_data_loss": true}'
//! ```

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use club_bracket::tournament::{
    BracketView, FinalizeOutcome, GenerateBracketRequest, GenerateOutcome, GenerationCheck, Match,
    PlayerResult, StructureReport, TournamentId,
};

use super::{ApiError, ApiResponse, ApiResult, AppState};
use crate::{logging, metrics};

/// `GET /tournaments/{id}/bracket/check`
pub async fn check_generation(
    State(state): State<AppState>,
    Path(tournament_id): Path<TournamentId>,
) -> ApiResult<GenerationCheck> {
    let check = state.manager.can_generate(tournament_id).await?;
    Ok(ApiResponse::ok(check))
}

/// `POST /tournaments/{id}/bracket`
///
/// Returns `201 Created` with the generation summary.
///
/// # Errors
///
/// - `409 Conflict`: bracket exists without `force_regenerate`, or played
///   matches exist without `confirm_data_loss`
/// - `422 Unprocessable Entity`: fewer than two participants
pub async fn generate_bracket(
    State(state): State<AppState>,
    Path(tournament_id): Path<TournamentId>,
    Json(request): Json<GenerateBracketRequest>,
) -> Result<(StatusCode, Json<ApiResponse<GenerateOutcome>>), ApiError> {
    let seeding_method = request.seeding_method;
    let outcome = state
        .manager
        .generate_bracket(tournament_id, request)
        .await?;

    metrics::brackets_generated_total(outcome.regenerated);
    metrics::bracket_size(outcome.bracket_size);
    logging::log_bracket_event(
        if outcome.regenerated {
            "bracket_regenerated"
        } else {
            "bracket_generated"
        },
        tournament_id,
        &format!(
            "{} players, {} rounds, {} byes, seeding {}",
            outcome.participant_count, outcome.rounds, outcome.byes, seeding_method
        ),
    );

    Ok((StatusCode::CREATED, ApiResponse::ok(outcome)))
}

/// `GET /tournaments/{id}/bracket`
pub async fn get_bracket(
    State(state): State<AppState>,
    Path(tournament_id): Path<TournamentId>,
) -> ApiResult<BracketView> {
    Ok(ApiResponse::ok(state.manager.bracket_view(tournament_id).await?))
}

/// `GET /tournaments/{id}/bracket/verify`
pub async fn verify_bracket(
    State(state): State<AppState>,
    Path(tournament_id): Path<TournamentId>,
) -> ApiResult<StructureReport> {
    Ok(ApiResponse::ok(
        state.manager.verify_bracket(tournament_id).await?,
    ))
}

/// `GET /tournaments/{id}/matches/pending`
pub async fn pending_matches(
    State(state): State<AppState>,
    Path(tournament_id): Path<TournamentId>,
) -> ApiResult<Vec<Match>> {
    Ok(ApiResponse::ok(
        state.manager.pending_matches(tournament_id).await?,
    ))
}

/// `POST /tournaments/{id}/finalize`
///
/// Repeat calls return the stored standings with `already_finalized: true`.
pub async fn finalize_tournament(
    State(state): State<AppState>,
    Path(tournament_id): Path<TournamentId>,
) -> ApiResult<FinalizeOutcome> {
    let outcome = state.manager.finalize_tournament(tournament_id).await?;

    metrics::tournaments_finalized_total(outcome.already_finalized);
    if !outcome.already_finalized {
        logging::log_bracket_event(
            "tournament_finalized",
            tournament_id,
            &format!("{} standings recorded", outcome.results.len()),
        );
    }

    Ok(ApiResponse::ok(outcome))
}

/// `GET /tournaments/{id}/results`
pub async fn get_results(
    State(state): State<AppState>,
    Path(tournament_id): Path<TournamentId>,
) -> ApiResult<Vec<PlayerResult>> {
    Ok(ApiResponse::ok(state.manager.get_results(tournament_id).await?))
}
