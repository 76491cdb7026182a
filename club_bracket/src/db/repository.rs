//! Repository trait for bracket storage and its PostgreSQL implementation.
//!
//! Every write runs in one transaction that first locks the tournament row,
//! so bracket writes for a tournament are serialized across processes. Match
//! updates carry guard predicates; a guard that matches no row is reported as
//! `BracketError::AdvancementConflict` and the transaction is rolled back.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use std::{sync::Arc, time::Duration};

use super::timeouts::{DEFAULT_QUERY_TIMEOUT, DEFAULT_TRANSACTION_TIMEOUT, with_deadline, with_timeout};
use crate::tournament::{
    BracketError, BracketMeta, BracketResult, GeneratedBracket, Match, MatchChange, MatchId,
    Participant, PlayerResult, RewardLogEntry, Seed, Tournament, TournamentId, TournamentStatus,
};

/// Storage port used by the bracket manager
#[async_trait]
pub trait BracketRepository: Send + Sync {
    /// Check that storage is reachable
    async fn health_check(&self) -> BracketResult<()>;

    async fn get_tournament(&self, tournament_id: TournamentId) -> BracketResult<Option<Tournament>>;

    /// Confirmed registrations with current ranking data
    async fn list_participants(&self, tournament_id: TournamentId) -> BracketResult<Vec<Participant>>;

    /// Stored bracket meta, seeds and matches
    async fn load_bracket(&self, tournament_id: TournamentId) -> BracketResult<Option<GeneratedBracket>>;

    /// Tournament that owns a match
    async fn tournament_for_match(&self, match_id: MatchId) -> BracketResult<Option<TournamentId>>;

    /// Replace any existing bracket wholesale, optionally moving the tournament status
    async fn replace_bracket(
        &self,
        bracket: &GeneratedBracket,
        status: Option<TournamentStatus>,
    ) -> BracketResult<()>;

    /// Apply guarded match writes atomically, optionally moving the tournament status
    ///
    /// # Errors
    ///
    /// * `BracketError::AdvancementConflict` - a guard failed; nothing was written
    async fn apply_match_changes(
        &self,
        tournament_id: TournamentId,
        changes: &[MatchChange],
        status: Option<TournamentStatus>,
    ) -> BracketResult<()>;

    /// Stored final standings, best position first
    async fn list_results(&self, tournament_id: TournamentId) -> BracketResult<Vec<PlayerResult>>;

    /// Rewards already booked for a tournament
    async fn list_reward_log(&self, tournament_id: TournamentId) -> BracketResult<Vec<RewardLogEntry>>;

    /// Store standings, book rewards and mark the tournament completed
    ///
    /// Returns `false` without writing anything when results are already on
    /// record. Reward entries are keyed by [`RewardLogEntry::key_for`]; an
    /// entry that already exists is neither duplicated nor re-applied to the
    /// player's ranking.
    async fn record_results(
        &self,
        tournament_id: TournamentId,
        results: &[PlayerResult],
    ) -> BracketResult<bool>;
}

/// PostgreSQL implementation of `BracketRepository`
pub struct PgBracketRepository {
    pool: Arc<PgPool>,
    query_timeout: Duration,
}

impl PgBracketRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }
}

#[async_trait]
impl BracketRepository for PgBracketRepository {
    async fn health_check(&self) -> BracketResult<()> {
        with_timeout(
            self.query_timeout,
            sqlx::query("SELECT 1").execute(self.pool.as_ref()),
        )
        .await?;
        Ok(())
    }

    async fn get_tournament(&self, tournament_id: TournamentId) -> BracketResult<Option<Tournament>> {
        let row = with_timeout(
            self.query_timeout,
            sqlx::query(
                "SELECT id, name, tournament_type, max_participants, current_participants,
                        status, has_third_place_match
                 FROM tournaments WHERE id = $1",
            )
            .bind(tournament_id)
            .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        row.as_ref().map(tournament_from_row).transpose()
    }

    async fn list_participants(&self, tournament_id: TournamentId) -> BracketResult<Vec<Participant>> {
        let rows = with_timeout(
            self.query_timeout,
            sqlx::query(
                r#"
                SELECT r.player_id, r.registered_at,
                       COALESCE(p.display_name, 'player_' || r.player_id::text) AS display_name,
                       COALESCE(p.elo_rating, 1000) AS elo_rating,
                       COALESCE(p.rank_tier, 'K') AS rank_tier
                FROM tournament_registrations r
                LEFT JOIN player_rankings p ON p.player_id = r.player_id
                WHERE r.tournament_id = $1 AND r.status = 'confirmed'
                ORDER BY r.registered_at, r.player_id
                "#,
            )
            .bind(tournament_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;

        rows.iter()
            .map(|row| -> BracketResult<Participant> {
                Ok(Participant {
                    player_id: row.get("player_id"),
                    display_name: row.get("display_name"),
                    elo_rating: row.get("elo_rating"),
                    rank_tier: row.get::<String, _>("rank_tier").parse()?,
                    registered_at: row.get::<NaiveDateTime, _>("registered_at").and_utc(),
                })
            })
            .collect()
    }

    async fn load_bracket(&self, tournament_id: TournamentId) -> BracketResult<Option<GeneratedBracket>> {
        let meta_row = with_timeout(
            self.query_timeout,
            sqlx::query("SELECT bracket_data FROM tournament_brackets WHERE tournament_id = $1")
                .bind(tournament_id)
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;
        let Some(meta_row) = meta_row else {
            return Ok(None);
        };
        let meta: BracketMeta =
            serde_json::from_value(meta_row.get::<serde_json::Value, _>("bracket_data"))?;

        let seed_rows = with_timeout(
            self.query_timeout,
            sqlx::query(
                "SELECT tournament_id, seed_position, player_id, elo_rating
                 FROM tournament_seeding WHERE tournament_id = $1
                 ORDER BY seed_position",
            )
            .bind(tournament_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;
        let seeds = seed_rows
            .iter()
            .map(|row| -> BracketResult<Seed> {
                Ok(Seed {
                    tournament_id: row.get("tournament_id"),
                    seed_position: to_u32(row.get("seed_position"), "seed_position")?,
                    player_id: row.get("player_id"),
                    elo_rating: row.get("elo_rating"),
                })
            })
            .collect::<BracketResult<Vec<_>>>()?;

        let match_rows = with_timeout(
            self.query_timeout,
            sqlx::query(
                "SELECT id, tournament_id, round_number, match_number, player1_id, player2_id,
                        status, winner_id, score_player1, score_player2, is_third_place_match,
                        started_at, completed_at
                 FROM tournament_matches WHERE tournament_id = $1
                 ORDER BY is_third_place_match, round_number, match_number",
            )
            .bind(tournament_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;
        let matches = match_rows
            .iter()
            .map(match_from_row)
            .collect::<BracketResult<Vec<_>>>()?;

        Ok(Some(GeneratedBracket {
            meta,
            seeds,
            matches,
        }))
    }

    async fn tournament_for_match(&self, match_id: MatchId) -> BracketResult<Option<TournamentId>> {
        let row = with_timeout(
            self.query_timeout,
            sqlx::query("SELECT tournament_id FROM tournament_matches WHERE id = $1")
                .bind(match_id)
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        Ok(row.map(|r| r.get("tournament_id")))
    }

    async fn replace_bracket(
        &self,
        bracket: &GeneratedBracket,
        status: Option<TournamentStatus>,
    ) -> BracketResult<()> {
        let tournament_id = bracket.meta.tournament_id;

        with_deadline(DEFAULT_TRANSACTION_TIMEOUT, async {
            let mut tx = self.pool.begin().await?;
            lock_tournament(&mut tx, tournament_id).await?;

            for table in ["tournament_matches", "tournament_seeding", "tournament_brackets"] {
                sqlx::query(&format!("DELETE FROM {table} WHERE tournament_id = $1"))
                    .bind(tournament_id)
                    .execute(&mut *tx)
                    .await?;
            }

            for seed in &bracket.seeds {
                sqlx::query(
                    "INSERT INTO tournament_seeding (tournament_id, seed_position, player_id, elo_rating)
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(tournament_id)
                .bind(seed.seed_position as i32)
                .bind(seed.player_id)
                .bind(seed.elo_rating)
                .execute(&mut *tx)
                .await?;
            }

            for m in &bracket.matches {
                sqlx::query(
                    r#"
                    INSERT INTO tournament_matches
                        (id, tournament_id, round_number, match_number, player1_id, player2_id,
                         status, winner_id, score_player1, score_player2, is_third_place_match,
                         started_at, completed_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                    "#,
                )
                .bind(m.id)
                .bind(tournament_id)
                .bind(m.round_number as i32)
                .bind(m.match_number as i32)
                .bind(m.player1_id)
                .bind(m.player2_id)
                .bind(m.status.to_string())
                .bind(m.winner_id)
                .bind(score_column(m.score_player1)?)
                .bind(score_column(m.score_player2)?)
                .bind(m.is_third_place_match)
                .bind(m.started_at.map(|t| t.naive_utc()))
                .bind(m.completed_at.map(|t| t.naive_utc()))
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query(
                "INSERT INTO tournament_brackets (tournament_id, bracket_data, generated_at)
                 VALUES ($1, $2, $3)",
            )
            .bind(tournament_id)
            .bind(serde_json::to_value(&bracket.meta)?)
            .bind(bracket.meta.generated_at.naive_utc())
            .execute(&mut *tx)
            .await?;

            if let Some(status) = status {
                set_status(&mut tx, tournament_id, status).await?;
            }

            tx.commit().await?;
            Ok::<_, BracketError>(())
        })
        .await
    }

    async fn apply_match_changes(
        &self,
        tournament_id: TournamentId,
        changes: &[MatchChange],
        status: Option<TournamentStatus>,
    ) -> BracketResult<()> {
        with_deadline(DEFAULT_TRANSACTION_TIMEOUT, async {
            let mut tx = self.pool.begin().await?;
            lock_tournament(&mut tx, tournament_id).await?;

            for change in changes {
                let updated = match change {
                    MatchChange::Started {
                        match_id,
                        started_at,
                    } => sqlx::query(
                        "UPDATE tournament_matches
                         SET status = 'in_progress', started_at = $3
                         WHERE id = $1 AND tournament_id = $2 AND status = 'scheduled'",
                    )
                    .bind(match_id)
                    .bind(tournament_id)
                    .bind(started_at.naive_utc())
                    .execute(&mut *tx)
                    .await?
                    .rows_affected(),
                    MatchChange::Completed {
                        match_id,
                        winner_id,
                        score_player1,
                        score_player2,
                        completed_at,
                    } => sqlx::query(
                        "UPDATE tournament_matches
                         SET status = 'completed', winner_id = $3, score_player1 = $4,
                             score_player2 = $5, completed_at = $6
                         WHERE id = $1 AND tournament_id = $2 AND status <> 'completed'",
                    )
                    .bind(match_id)
                    .bind(tournament_id)
                    .bind(winner_id)
                    .bind(score_column(*score_player1)?)
                    .bind(score_column(*score_player2)?)
                    .bind(completed_at.naive_utc())
                    .execute(&mut *tx)
                    .await?
                    .rows_affected(),
                    MatchChange::SlotFilled {
                        match_id,
                        slot,
                        player_id,
                    } => {
                        let column = slot.column();
                        sqlx::query(&format!(
                            "UPDATE tournament_matches SET {column} = $3
                             WHERE id = $1 AND tournament_id = $2
                               AND ({column} IS NULL OR {column} = $3)"
                        ))
                        .bind(match_id)
                        .bind(tournament_id)
                        .bind(player_id)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected()
                    }
                };

                if updated == 0 {
                    log::warn!(
                        "Guarded write on match {} of tournament {} matched no row, rolling back",
                        change.match_id(),
                        tournament_id
                    );
                    return Err(BracketError::AdvancementConflict(change.match_id()));
                }
            }

            if let Some(status) = status {
                set_status(&mut tx, tournament_id, status).await?;
            }

            tx.commit().await?;
            Ok::<_, BracketError>(())
        })
        .await
    }

    async fn list_results(&self, tournament_id: TournamentId) -> BracketResult<Vec<PlayerResult>> {
        let rows = with_timeout(
            self.query_timeout,
            sqlx::query(
                "SELECT tournament_id, player_id, final_position, reward_bucket, elo_before,
                        elo_after, elo_change, spa_points_earned, wins, losses, matches_played,
                        reward_source
                 FROM match_results WHERE tournament_id = $1
                 ORDER BY final_position, player_id",
            )
            .bind(tournament_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;

        rows.iter()
            .map(|row| -> BracketResult<PlayerResult> {
                Ok(PlayerResult {
                    tournament_id: row.get("tournament_id"),
                    player_id: row.get("player_id"),
                    final_position: to_u32(row.get("final_position"), "final_position")?,
                    reward_bucket: row.get::<String, _>("reward_bucket").parse()?,
                    elo_before: row.get("elo_before"),
                    elo_after: row.get("elo_after"),
                    elo_change: row.get("elo_change"),
                    spa_points_earned: row.get("spa_points_earned"),
                    wins: to_u32(row.get("wins"), "wins")?,
                    losses: to_u32(row.get("losses"), "losses")?,
                    matches_played: to_u32(row.get("matches_played"), "matches_played")?,
                    reward_source: row.get::<String, _>("reward_source").parse()?,
                })
            })
            .collect()
    }

    async fn list_reward_log(&self, tournament_id: TournamentId) -> BracketResult<Vec<RewardLogEntry>> {
        let rows = with_timeout(
            self.query_timeout,
            sqlx::query(
                "SELECT tournament_id, player_id, elo_change, points, idempotency_key, created_at
                 FROM spa_points_log WHERE tournament_id = $1
                 ORDER BY id",
            )
            .bind(tournament_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;

        Ok(rows
            .iter()
            .map(|row| RewardLogEntry {
                tournament_id: row.get("tournament_id"),
                player_id: row.get("player_id"),
                elo_change: row.get("elo_change"),
                spa_points: row.get("points"),
                idempotency_key: row.get("idempotency_key"),
                created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
            })
            .collect())
    }

    async fn record_results(
        &self,
        tournament_id: TournamentId,
        results: &[PlayerResult],
    ) -> BracketResult<bool> {
        with_deadline(DEFAULT_TRANSACTION_TIMEOUT, async {
            let mut tx = self.pool.begin().await?;
            lock_tournament(&mut tx, tournament_id).await?;

            let existing: i64 =
                sqlx::query("SELECT COUNT(*) AS count FROM match_results WHERE tournament_id = $1")
                    .bind(tournament_id)
                    .fetch_one(&mut *tx)
                    .await?
                    .get("count");
            if existing > 0 {
                return Ok::<_, BracketError>(false);
            }

            for result in results {
                sqlx::query(
                    r#"
                    INSERT INTO match_results
                        (tournament_id, player_id, final_position, reward_bucket, elo_before,
                         elo_after, elo_change, spa_points_earned, wins, losses, matches_played,
                         reward_source)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                    "#,
                )
                .bind(tournament_id)
                .bind(result.player_id)
                .bind(result.final_position as i32)
                .bind(result.reward_bucket.to_string())
                .bind(result.elo_before)
                .bind(result.elo_after)
                .bind(result.elo_change)
                .bind(result.spa_points_earned)
                .bind(result.wins as i32)
                .bind(result.losses as i32)
                .bind(result.matches_played as i32)
                .bind(result.reward_source.to_string())
                .execute(&mut *tx)
                .await?;

                let booked = sqlx::query(
                    r#"
                    INSERT INTO spa_points_log
                        (player_id, tournament_id, points, elo_change, idempotency_key, description)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT (idempotency_key) DO NOTHING
                    "#,
                )
                .bind(result.player_id)
                .bind(tournament_id)
                .bind(result.spa_points_earned)
                .bind(result.elo_change)
                .bind(RewardLogEntry::key_for(tournament_id, result.player_id))
                .bind(format!(
                    "Tournament {tournament_id}: position {}",
                    result.final_position
                ))
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if booked == 1 {
                    sqlx::query(
                        "UPDATE player_rankings
                         SET elo_rating = elo_rating + $2, spa_points = spa_points + $3,
                             updated_at = NOW()
                         WHERE player_id = $1",
                    )
                    .bind(result.player_id)
                    .bind(result.elo_change)
                    .bind(result.spa_points_earned)
                    .execute(&mut *tx)
                    .await?;
                }
            }

            set_status(&mut tx, tournament_id, TournamentStatus::Completed).await?;
            tx.commit().await?;
            Ok::<_, BracketError>(true)
        })
        .await
    }
}

fn score_column(score: Option<u32>) -> BracketResult<Option<i32>> {
    score
        .map(|s| {
            i32::try_from(s)
                .map_err(|_| BracketError::InvalidData(format!("score {s} exceeds column range")))
        })
        .transpose()
}

async fn lock_tournament(
    tx: &mut Transaction<'_, Postgres>,
    tournament_id: TournamentId,
) -> BracketResult<()> {
    let row = sqlx::query("SELECT id FROM tournaments WHERE id = $1 FOR UPDATE")
        .bind(tournament_id)
        .fetch_optional(&mut **tx)
        .await?;
    match row {
        Some(_) => Ok(()),
        None => Err(BracketError::TournamentNotFound(tournament_id)),
    }
}

async fn set_status(
    tx: &mut Transaction<'_, Postgres>,
    tournament_id: TournamentId,
    status: TournamentStatus,
) -> BracketResult<()> {
    sqlx::query("UPDATE tournaments SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(tournament_id)
        .bind(status.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn tournament_from_row(row: &PgRow) -> BracketResult<Tournament> {
    Ok(Tournament {
        id: row.get("id"),
        name: row.get("name"),
        tournament_type: row.get::<String, _>("tournament_type").parse()?,
        max_participants: to_u32(row.get("max_participants"), "max_participants")?,
        current_participants: to_u32(row.get("current_participants"), "current_participants")?,
        status: row.get::<String, _>("status").parse()?,
        has_third_place_match: row.get("has_third_place_match"),
    })
}

fn match_from_row(row: &PgRow) -> BracketResult<Match> {
    let score = |column: &'static str| -> BracketResult<Option<u32>> {
        row.get::<Option<i32>, _>(column)
            .map(|s| to_u32(s, column))
            .transpose()
    };

    Ok(Match {
        id: row.get("id"),
        tournament_id: row.get("tournament_id"),
        round_number: to_u32(row.get("round_number"), "round_number")?,
        match_number: to_u32(row.get("match_number"), "match_number")?,
        player1_id: row.get("player1_id"),
        player2_id: row.get("player2_id"),
        status: row.get::<String, _>("status").parse()?,
        winner_id: row.get("winner_id"),
        score_player1: score("score_player1")?,
        score_player2: score("score_player2")?,
        is_third_place_match: row.get("is_third_place_match"),
        started_at: row
            .get::<Option<NaiveDateTime>, _>("started_at")
            .map(|t| t.and_utc()),
        completed_at: row
            .get::<Option<NaiveDateTime>, _>("completed_at")
            .map(|t| t.and_utc()),
    })
}

fn to_u32(value: i32, column: &str) -> BracketResult<u32> {
    u32::try_from(value)
        .map_err(|_| BracketError::InvalidData(format!("{column} is negative: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_column_range() {
        assert_eq!(score_column(None).unwrap(), None);
        assert_eq!(score_column(Some(7)).unwrap(), Some(7));
        assert_eq!(score_column(Some(i32::MAX as u32)).unwrap(), Some(i32::MAX));
        assert!(matches!(
            score_column(Some(3_000_000_000)),
            Err(BracketError::InvalidData(_))
        ));
    }

    #[test]
    fn test_negative_column_rejected() {
        assert_eq!(to_u32(4, "round_number").unwrap(), 4);
        assert!(matches!(to_u32(-1, "score_player1"), Err(BracketError::InvalidData(_))));
    }
}
