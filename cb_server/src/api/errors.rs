//! Mapping of engine errors onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use club_bracket::BracketError;
use serde::{Deserialize, Serialize};

use crate::metrics;

/// Failure body: `{"success": false, "error": ..., "code": ..., "retryable": ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    pub retryable: bool,
}

/// Handler error wrapping a [`BracketError`]
#[derive(Debug)]
pub struct ApiError(pub BracketError);

impl From<BracketError> for ApiError {
    fn from(err: BracketError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    /// HTTP status for the error class
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            BracketError::InvalidParticipantCount(_)
            | BracketError::DuplicateParticipant(_)
            | BracketError::InvalidMatchState { .. }
            | BracketError::UnsupportedTournamentType(_) => StatusCode::UNPROCESSABLE_ENTITY,

            BracketError::BracketAlreadyExists(_)
            | BracketError::RegenerationBlocked { .. }
            | BracketError::AdvancementConflict(_)
            | BracketError::TournamentNotComplete(_)
            | BracketError::InvalidTournamentStatus { .. } => StatusCode::CONFLICT,

            BracketError::TournamentNotFound(_)
            | BracketError::MatchNotFound(_)
            | BracketError::BracketNotFound(_) => StatusCode::NOT_FOUND,

            BracketError::Database(_) | BracketError::Timeout => StatusCode::SERVICE_UNAVAILABLE,

            BracketError::InvalidRewardPolicy(_)
            | BracketError::InvalidData(_)
            | BracketError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.0.code();

        if status.is_server_error() {
            tracing::error!(code = code, error = %self.0, "Request failed");
        } else {
            tracing::warn!(code = code, error = %self.0, "Request rejected");
        }

        metrics::api_errors_total(code);
        if matches!(self.0, BracketError::AdvancementConflict(_)) {
            metrics::advancement_conflicts_total();
        }

        let body = ErrorResponse {
            success: false,
            error: self.0.client_message(),
            code: code.to_string(),
            retryable: self.0.is_retryable(),
        };

        (status, Json(body)).into_response()
    }
}
