//! # Club Bracket
//!
//! Single-elimination bracket engine for club tournaments.
//!
//! A tournament's confirmed participants are seeded, placed into a
//! power-of-two bracket (byes go to the top seeds), and played out match by
//! match. Each reported result advances the winner; completing the final
//! produces standings with ELO and SPA rewards scaled by rank tier.
//!
//! ## Core Modules
//!
//! - [`tournament`]: Seeding, bracket construction, advancement, standings and views
//! - [`db`]: Storage ports with PostgreSQL and in-memory adapters
//!
//! ## Example
//!
//! ```
//! use club_bracket::tournament::{RankTier, RewardPolicy, seeding::bracket_order};
//!
//! // Seeds 1 and 2 can only meet in the final
//! assert_eq!(bracket_order(8), vec![1, 8, 4, 5, 2, 7, 3, 6]);
//!
//! // Champion's SPA for the lowest tier
//! assert_eq!(RewardPolicy::default().spa_points(1, RankTier::K), 1000);
//! ```

/// Storage ports and adapters.
pub mod db;

/// Bracket lifecycle: seeding, building, advancement, standings and views.
pub mod tournament;

pub use db::{BracketRepository, InMemoryBracketRepository, PgBracketRepository};
pub use tournament::{BracketError, BracketManager, BracketResult};
