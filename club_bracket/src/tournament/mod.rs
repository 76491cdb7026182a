//! Single-elimination tournament brackets.
//!
//! This module provides the bracket lifecycle:
//! - Seeding by rating, registration order or seeded shuffle
//! - Bracket construction with byes and an optional third-place match
//! - Match advancement with guarded, idempotent writes
//! - Final standings with rank-scaled rewards
//! - Display views and structure checks
//!
//! ## Example
//!
//! ```no_run
//! use club_bracket::db::{Database, PgBracketRepository};
//! use club_bracket::tournament::{
//!     BracketManager, GenerateBracketRequest, RewardPolicy, SeedingMethod,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&Default::default()).await?;
//!     let repo = Arc::new(PgBracketRepository::new(Arc::new(db.pool().clone())));
//!     let manager = BracketManager::new(repo, Arc::new(RewardPolicy::default()));
//!
//!     let outcome = manager
//!         .generate_bracket(42, GenerateBracketRequest::new(SeedingMethod::EloRanking))
//!         .await?;
//!     println!("{} matches over {} rounds", outcome.matches_created, outcome.rounds);
//!
//!     Ok(())
//! }
//! ```

pub mod advancement;
pub mod bracket;
pub mod builder;
pub mod errors;
pub mod manager;
pub mod models;
pub mod presentation;
pub mod rewards;
pub mod seeding;
pub mod standings;

pub use advancement::{Advancement, MatchChange};
pub use bracket::Bracket;
pub use builder::generate_bracket;
pub use errors::{BracketError, BracketResult};
pub use manager::BracketManager;
pub use models::{
    AdvancementOutcome, BracketMeta, FinalizeOutcome, GenerateBracketRequest, GenerateOutcome,
    GeneratedBracket, GenerationCheck, Match, MatchId, MatchStatus, Participant, PlayerId,
    PlayerResult, RewardLogEntry, RewardSource, Seed, SeedingMethod, Slot, Tournament,
    TournamentId, TournamentStatus, TournamentType,
};
pub use presentation::{BracketView, RoundView, StructureReport, round_label};
pub use rewards::{RankTier, RewardBucket, RewardPolicy};
pub use seeding::assign_seeds;
pub use standings::compute_standings;
