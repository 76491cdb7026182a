//! Tournament bracket data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

use super::errors::BracketError;
use super::rewards::{RankTier, RewardBucket};

/// Tournament ID type
pub type TournamentId = i64;

/// Player ID type
pub type PlayerId = i64;

/// Match ID type
pub type MatchId = Uuid;

/// Tournament format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentType {
    SingleElimination,
    DoubleElimination,
    RoundRobin,
    Swiss,
}

impl TournamentType {
    /// Whether the bracket engine can generate and run this format
    pub fn is_supported(self) -> bool {
        matches!(self, TournamentType::SingleElimination)
    }
}

impl fmt::Display for TournamentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TournamentType::SingleElimination => write!(f, "single_elimination"),
            TournamentType::DoubleElimination => write!(f, "double_elimination"),
            TournamentType::RoundRobin => write!(f, "round_robin"),
            TournamentType::Swiss => write!(f, "swiss"),
        }
    }
}

impl FromStr for TournamentType {
    type Err = BracketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_elimination" => Ok(TournamentType::SingleElimination),
            "double_elimination" => Ok(TournamentType::DoubleElimination),
            "round_robin" => Ok(TournamentType::RoundRobin),
            "swiss" => Ok(TournamentType::Swiss),
            other => Err(BracketError::InvalidData(format!(
                "unknown tournament type '{other}'"
            ))),
        }
    }
}

/// Tournament lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Upcoming,
    RegistrationOpen,
    RegistrationClosed,
    Ongoing,
    Completed,
    Cancelled,
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TournamentStatus::Upcoming => write!(f, "upcoming"),
            TournamentStatus::RegistrationOpen => write!(f, "registration_open"),
            TournamentStatus::RegistrationClosed => write!(f, "registration_closed"),
            TournamentStatus::Ongoing => write!(f, "ongoing"),
            TournamentStatus::Completed => write!(f, "completed"),
            TournamentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for TournamentStatus {
    type Err = BracketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(TournamentStatus::Upcoming),
            "registration_open" => Ok(TournamentStatus::RegistrationOpen),
            "registration_closed" => Ok(TournamentStatus::RegistrationClosed),
            "ongoing" => Ok(TournamentStatus::Ongoing),
            "completed" => Ok(TournamentStatus::Completed),
            "cancelled" => Ok(TournamentStatus::Cancelled),
            other => Err(BracketError::InvalidData(format!(
                "unknown tournament status '{other}'"
            ))),
        }
    }
}

/// Tournament as seen by the bracket engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub tournament_type: TournamentType,
    pub max_participants: u32,
    pub current_participants: u32,
    pub status: TournamentStatus,
    pub has_third_place_match: bool,
}

/// Registered participant with the ranking data used for seeding and rewards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub player_id: PlayerId,
    pub display_name: String,
    pub elo_rating: i32,
    pub rank_tier: RankTier,
    pub registered_at: DateTime<Utc>,
}

/// How seed positions are assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedingMethod {
    /// Highest rating first, earlier registration breaks ties
    EloRanking,
    /// First registered, first seeded
    RegistrationOrder,
    /// Uniform shuffle
    Random,
}

impl fmt::Display for SeedingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedingMethod::EloRanking => write!(f, "elo_ranking"),
            SeedingMethod::RegistrationOrder => write!(f, "registration_order"),
            SeedingMethod::Random => write!(f, "random"),
        }
    }
}

/// A bracket slot. `player_id` is `None` for a bye.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    pub tournament_id: TournamentId,
    /// 1-based, dense across the whole bracket including byes
    pub seed_position: u32,
    pub player_id: Option<PlayerId>,
    /// Rating at seeding time
    pub elo_rating: Option<i32>,
}

impl Seed {
    pub fn is_bye(&self) -> bool {
        self.player_id.is_none()
    }
}

/// Match status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    InProgress,
    Completed,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::Scheduled => write!(f, "scheduled"),
            MatchStatus::InProgress => write!(f, "in_progress"),
            MatchStatus::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for MatchStatus {
    type Err = BracketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(MatchStatus::Scheduled),
            "in_progress" => Ok(MatchStatus::InProgress),
            "completed" => Ok(MatchStatus::Completed),
            other => Err(BracketError::InvalidData(format!(
                "unknown match status '{other}'"
            ))),
        }
    }
}

/// Player slot within a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Player1,
    Player2,
}

impl Slot {
    /// Slot fed by the winner of a given match number in the previous round
    pub fn for_feeder(match_number: u32) -> Self {
        if match_number % 2 == 1 {
            Slot::Player1
        } else {
            Slot::Player2
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Slot::Player1 => "player1_id",
            Slot::Player2 => "player2_id",
        }
    }
}

/// A bracket match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub round_number: u32,
    pub match_number: u32,
    pub player1_id: Option<PlayerId>,
    pub player2_id: Option<PlayerId>,
    pub status: MatchStatus,
    pub winner_id: Option<PlayerId>,
    pub score_player1: Option<u32>,
    pub score_player2: Option<u32>,
    pub is_third_place_match: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Match {
    /// Create an empty scheduled match
    pub fn shell(tournament_id: TournamentId, round_number: u32, match_number: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            tournament_id,
            round_number,
            match_number,
            player1_id: None,
            player2_id: None,
            status: MatchStatus::Scheduled,
            winner_id: None,
            score_player1: None,
            score_player2: None,
            is_third_place_match: false,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn slot(&self, slot: Slot) -> Option<PlayerId> {
        match slot {
            Slot::Player1 => self.player1_id,
            Slot::Player2 => self.player2_id,
        }
    }

    pub fn set_slot(&mut self, slot: Slot, player_id: PlayerId) {
        match slot {
            Slot::Player1 => self.player1_id = Some(player_id),
            Slot::Player2 => self.player2_id = Some(player_id),
        }
    }

    pub fn has_both_players(&self) -> bool {
        self.player1_id.is_some() && self.player2_id.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.status == MatchStatus::Completed
    }

    /// Completed without being played: a bye or a walkover
    pub fn is_bye(&self) -> bool {
        self.is_completed() && self.player1_id.is_some() != self.player2_id.is_some()
    }

    /// Both players known and no result yet
    pub fn is_ready(&self) -> bool {
        self.has_both_players() && !self.is_completed()
    }

    pub fn involves(&self, player_id: PlayerId) -> bool {
        self.player1_id == Some(player_id) || self.player2_id == Some(player_id)
    }

    pub fn loser_id(&self) -> Option<PlayerId> {
        let winner = self.winner_id?;
        if self.player1_id == Some(winner) {
            self.player2_id
        } else if self.player2_id == Some(winner) {
            self.player1_id
        } else {
            None
        }
    }
}

/// Snapshot of the bracket shape at generation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketMeta {
    pub tournament_id: TournamentId,
    pub tournament_type: TournamentType,
    pub bracket_size: u32,
    pub participant_count: u32,
    pub rounds: u32,
    pub seeding_method: SeedingMethod,
    pub has_third_place_match: bool,
    pub generated_at: DateTime<Utc>,
}

impl BracketMeta {
    /// Matches a complete bracket of this shape contains
    pub fn expected_match_count(&self) -> u32 {
        let third_place = u32::from(self.has_third_place_match && self.rounds >= 2);
        self.bracket_size - 1 + third_place
    }

    pub fn byes(&self) -> u32 {
        self.bracket_size - self.participant_count
    }
}

/// Output of the bracket builder, persisted as one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedBracket {
    pub meta: BracketMeta,
    pub seeds: Vec<Seed>,
    pub matches: Vec<Match>,
}

/// Which path produced a player's reward figures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardSource {
    /// Taken from reward log entries already on record
    Recorded,
    /// Calculated from the reward table
    Computed,
}

impl fmt::Display for RewardSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardSource::Recorded => write!(f, "recorded"),
            RewardSource::Computed => write!(f, "computed"),
        }
    }
}

impl FromStr for RewardSource {
    type Err = BracketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recorded" => Ok(RewardSource::Recorded),
            "computed" => Ok(RewardSource::Computed),
            other => Err(BracketError::InvalidData(format!(
                "unknown reward source '{other}'"
            ))),
        }
    }
}

/// Final standing of one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerResult {
    pub tournament_id: TournamentId,
    pub player_id: PlayerId,
    pub final_position: u32,
    pub reward_bucket: RewardBucket,
    pub elo_before: i32,
    pub elo_after: i32,
    pub elo_change: i32,
    pub spa_points_earned: i64,
    pub wins: u32,
    pub losses: u32,
    pub matches_played: u32,
    pub reward_source: RewardSource,
}

/// Reward already booked for a player in a tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardLogEntry {
    pub tournament_id: TournamentId,
    pub player_id: PlayerId,
    pub elo_change: i32,
    pub spa_points: i64,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl RewardLogEntry {
    /// Idempotency key of the reward booked for a player in a tournament
    pub fn key_for(tournament_id: TournamentId, player_id: PlayerId) -> String {
        format!("tournament:{tournament_id}:player:{player_id}")
    }
}

/// Pre-check for bracket generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub participant_count: u32,
    pub bracket_exists: bool,
    pub tournament_type: TournamentType,
}

/// Bracket generation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateBracketRequest {
    pub seeding_method: SeedingMethod,
    #[serde(default)]
    pub force_regenerate: bool,
    /// Required to regenerate over matches that were actually played
    #[serde(default)]
    pub confirm_data_loss: bool,
    /// Seed for the `random` method; drawn from the OS when absent
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl GenerateBracketRequest {
    pub fn new(seeding_method: SeedingMethod) -> Self {
        Self {
            seeding_method,
            force_regenerate: false,
            confirm_data_loss: false,
            random_seed: None,
        }
    }

    pub fn force(mut self) -> Self {
        self.force_regenerate = true;
        self
    }

    pub fn confirm_data_loss(mut self) -> Self {
        self.confirm_data_loss = true;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }
}

/// Summary of a generated bracket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateOutcome {
    pub participant_count: u32,
    pub matches_created: u32,
    pub rounds: u32,
    pub bracket_size: u32,
    pub byes: u32,
    pub regenerated: bool,
}

/// Result of reporting or re-advancing a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancementOutcome {
    pub match_id: MatchId,
    pub winner_id: PlayerId,
    pub loser_id: Option<PlayerId>,
    pub tournament_complete: bool,
    pub next_round: Option<u32>,
    pub next_match_number: Option<u32>,
    /// Both third-place slots became known with this result
    pub third_place_ready: bool,
    /// Standings, present when this result completed the tournament
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_results: Option<Vec<PlayerResult>>,
}

/// Result of finalizing standings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeOutcome {
    pub results: Vec<PlayerResult>,
    /// Results were already on record; nothing new was awarded
    pub already_finalized: bool,
}
