//! Match-level endpoints.
//!
//! Report a result:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/matches/<match-uuid>/result \
//!   -H "Content-Type: application/json" \
//!   -d '{"winner_id": 17, "score_player1": 7, "score_player2": 4}'
//! ```

use axum::{
    Json,
    extract::{Path, State},
};
use club_bracket::tournament::{AdvancementOutcome, Match, MatchId, PlayerId, TournamentId};
use serde::Deserialize;

use super::{ApiResponse, ApiResult, AppState, request_id::RequestId};
use crate::{logging, metrics};

#[derive(Debug, Deserialize)]
pub struct ReportResultPayload {
    pub winner_id: PlayerId,
    pub score_player1: u32,
    pub score_player2: u32,
}

#[derive(Debug, Deserialize)]
pub struct AdvancePayload {
    pub tournament_id: TournamentId,
}

/// `POST /matches/{id}/start`
pub async fn start_match(
    State(state): State<AppState>,
    Path(match_id): Path<MatchId>,
) -> ApiResult<Match> {
    Ok(ApiResponse::ok(state.manager.start_match(match_id).await?))
}

/// `POST /matches/{id}/result`
///
/// Records the result and advances the winner in one step. When the result
/// completes the tournament the response carries `final_results`.
///
/// # Errors
///
/// - `422 Unprocessable Entity`: match already completed, missing a player,
///   or the winner is not one of its players
/// - `409 Conflict`: a concurrent report won the race; re-read and retry
pub async fn report_result(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(match_id): Path<MatchId>,
    Json(payload): Json<ReportResultPayload>,
) -> ApiResult<AdvancementOutcome> {
    let outcome = state
        .manager
        .report_result(
            match_id,
            payload.winner_id,
            payload.score_player1,
            payload.score_player2,
        )
        .await?;

    metrics::match_results_total();
    tracing::info!(
        request_id = %request_id.as_str(),
        match_id = %match_id,
        winner_id = outcome.winner_id,
        next_round = outcome.next_round,
        next_match_number = outcome.next_match_number,
        "Match result recorded"
    );

    if let Some(results) = &outcome.final_results {
        metrics::tournaments_finalized_total(false);
        if let Some(champion) = results.iter().find(|r| r.final_position == 1) {
            logging::log_bracket_event(
                "tournament_completed",
                champion.tournament_id,
                &format!("champion {}", champion.player_id),
            );
        }
    }

    Ok(ApiResponse::ok(outcome))
}

/// `POST /matches/{id}/advance`
///
/// Idempotent repair: fills any downstream slots a completed match should
/// have filled.
pub async fn advance_winner(
    State(state): State<AppState>,
    Path(match_id): Path<MatchId>,
    Json(payload): Json<AdvancePayload>,
) -> ApiResult<AdvancementOutcome> {
    let outcome = state
        .manager
        .advance_winner(match_id, payload.tournament_id)
        .await?;
    Ok(ApiResponse::ok(outcome))
}
