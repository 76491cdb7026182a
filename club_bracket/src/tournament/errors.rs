//! Bracket engine error types.

use thiserror::Error;

use super::models::{MatchId, PlayerId, TournamentId, TournamentStatus, TournamentType};
use crate::db::timeouts::TimeoutError;

/// Bracket engine errors
#[derive(Debug, Error)]
pub enum BracketError {
    /// Fewer than two participants
    #[error("Invalid participant count: need at least 2, have {0}")]
    InvalidParticipantCount(usize),

    /// Same player registered twice
    #[error("Duplicate participant: {0}")]
    DuplicateParticipant(PlayerId),

    /// Bracket present and regeneration was not requested
    #[error("Bracket already exists for tournament {0}")]
    BracketAlreadyExists(TournamentId),

    /// Regeneration would discard played matches
    #[error("Regeneration would discard {completed} played match(es); confirm data loss to proceed")]
    RegenerationBlocked { completed: usize },

    /// Result rejected by the match state machine
    #[error("Invalid match state for {match_id}: {reason}")]
    InvalidMatchState { match_id: MatchId, reason: String },

    /// Concurrent write on the same match or slot
    #[error("Advancement conflict on match {0}")]
    AdvancementConflict(MatchId),

    /// Standings requested before the bracket finished
    #[error("Tournament {0} is not complete")]
    TournamentNotComplete(TournamentId),

    /// Format without an executable bracket
    #[error("Unsupported tournament type: {0}")]
    UnsupportedTournamentType(TournamentType),

    /// Tournament status does not allow the operation
    #[error("Tournament is {status}: {reason}")]
    InvalidTournamentStatus {
        status: TournamentStatus,
        reason: String,
    },

    #[error("Tournament not found: {0}")]
    TournamentNotFound(TournamentId),

    #[error("Match not found: {0}")]
    MatchNotFound(MatchId),

    #[error("No bracket generated for tournament {0}")]
    BracketNotFound(TournamentId),

    /// Reward table failed validation
    #[error("Invalid reward policy: {0}")]
    InvalidRewardPolicy(String),

    /// Stored data could not be interpreted
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage operation timed out")]
    Timeout,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<TimeoutError> for BracketError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Timeout(_) => BracketError::Timeout,
            TimeoutError::Database(e) => BracketError::Database(e),
        }
    }
}

impl BracketError {
    /// Stable machine-readable reason string
    pub fn code(&self) -> &'static str {
        match self {
            BracketError::InvalidParticipantCount(_) => "invalid_participant_count",
            BracketError::DuplicateParticipant(_) => "duplicate_participant",
            BracketError::BracketAlreadyExists(_) => "bracket_already_exists",
            BracketError::RegenerationBlocked { .. } => "regeneration_blocked",
            BracketError::InvalidMatchState { .. } => "invalid_match_state",
            BracketError::AdvancementConflict(_) => "advancement_conflict",
            BracketError::TournamentNotComplete(_) => "tournament_not_complete",
            BracketError::UnsupportedTournamentType(_) => "unsupported_tournament_type",
            BracketError::InvalidTournamentStatus { .. } => "invalid_tournament_status",
            BracketError::TournamentNotFound(_) => "tournament_not_found",
            BracketError::MatchNotFound(_) => "match_not_found",
            BracketError::BracketNotFound(_) => "bracket_not_found",
            BracketError::InvalidRewardPolicy(_) => "invalid_reward_policy",
            BracketError::InvalidData(_) => "invalid_data",
            BracketError::Database(_) | BracketError::Timeout => "storage_unavailable",
            BracketError::Serialization(_) => "internal_error",
        }
    }

    /// Whether repeating the request after re-reading state can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BracketError::AdvancementConflict(_)
                | BracketError::Database(_)
                | BracketError::Timeout
        )
    }

    /// Get a client-safe error message that doesn't leak storage details
    pub fn client_message(&self) -> String {
        match self {
            BracketError::Database(_) | BracketError::Timeout => {
                "Storage temporarily unavailable, please retry".to_string()
            }
            BracketError::Serialization(_) | BracketError::InvalidData(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    pub(crate) fn invalid_match(match_id: MatchId, reason: impl Into<String>) -> Self {
        BracketError::InvalidMatchState {
            match_id,
            reason: reason.into(),
        }
    }
}

/// Result type for bracket operations
pub type BracketResult<T> = Result<T, BracketError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            BracketError::InvalidParticipantCount(1).code(),
            "invalid_participant_count"
        );
        assert_eq!(
            BracketError::BracketAlreadyExists(3).code(),
            "bracket_already_exists"
        );
        assert_eq!(
            BracketError::AdvancementConflict(Uuid::nil()).code(),
            "advancement_conflict"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BracketError::AdvancementConflict(Uuid::nil()).is_retryable());
        assert!(BracketError::Timeout.is_retryable());
        assert!(!BracketError::InvalidParticipantCount(0).is_retryable());
        assert!(!BracketError::invalid_match(Uuid::nil(), "already completed").is_retryable());
    }

    #[test]
    fn test_client_message_hides_storage_details() {
        let err = BracketError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(
            err.client_message(),
            "Storage temporarily unavailable, please retry"
        );

        let err = BracketError::invalid_match(Uuid::nil(), "winner is not a player in this match");
        assert!(err.client_message().contains("winner is not a player"));
    }

    #[test]
    fn test_timeout_conversion() {
        let err: BracketError = TimeoutError::Timeout(Duration::from_secs(5)).into();
        assert!(matches!(err, BracketError::Timeout));
    }
}
