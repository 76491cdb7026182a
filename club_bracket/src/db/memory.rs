//! In-memory `BracketRepository` for tests and local runs.
//!
//! Applies the same guards as the PostgreSQL adapter: match changes are
//! all-or-nothing and a failed guard is an `AdvancementConflict`.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::repository::BracketRepository;
use crate::tournament::{
    BracketError, BracketResult, GeneratedBracket, Match, MatchChange, MatchId, Participant,
    PlayerId, PlayerResult, RewardLogEntry, Tournament, TournamentId, TournamentStatus,
};

#[derive(Default)]
struct MemoryState {
    tournaments: HashMap<TournamentId, Tournament>,
    participants: HashMap<TournamentId, Vec<Participant>>,
    brackets: HashMap<TournamentId, GeneratedBracket>,
    results: HashMap<TournamentId, Vec<PlayerResult>>,
    reward_log: Vec<RewardLogEntry>,
    /// Current (elo, spa) per player
    rankings: HashMap<PlayerId, (i32, i64)>,
    unavailable: bool,
    /// Fail only `record_results`
    results_unavailable: bool,
}

impl MemoryState {
    fn check_available(&self) -> BracketResult<()> {
        if self.unavailable {
            return Err(BracketError::Timeout);
        }
        Ok(())
    }

    fn tournament_mut(&mut self, tournament_id: TournamentId) -> BracketResult<&mut Tournament> {
        self.tournaments
            .get_mut(&tournament_id)
            .ok_or(BracketError::TournamentNotFound(tournament_id))
    }
}

/// Repository keeping everything in process memory
#[derive(Default)]
pub struct InMemoryBracketRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryBracketRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_tournament(&self, tournament: Tournament) {
        let mut state = self.state.write().await;
        state.tournaments.insert(tournament.id, tournament);
    }

    /// Register a confirmed participant and seed their ranking
    pub async fn add_participant(&self, tournament_id: TournamentId, participant: Participant) {
        let mut state = self.state.write().await;
        state
            .rankings
            .entry(participant.player_id)
            .or_insert((participant.elo_rating, 0));
        if let Some(tournament) = state.tournaments.get_mut(&tournament_id) {
            tournament.current_participants += 1;
        }
        state
            .participants
            .entry(tournament_id)
            .or_default()
            .push(participant);
    }

    /// Book a reward outside of finalization
    pub async fn add_reward_log_entry(&self, entry: RewardLogEntry) {
        let mut state = self.state.write().await;
        if let Some((elo, spa)) = state.rankings.get_mut(&entry.player_id) {
            *elo += entry.elo_change;
            *spa += entry.spa_points;
        }
        state.reward_log.push(entry);
    }

    /// Current (elo, spa) of a player
    pub async fn ranking(&self, player_id: PlayerId) -> Option<(i32, i64)> {
        self.state.read().await.rankings.get(&player_id).copied()
    }

    /// Overwrite one stored match, bypassing every guard
    pub async fn overwrite_match(&self, m: Match) {
        let mut state = self.state.write().await;
        if let Some(bracket) = state.brackets.get_mut(&m.tournament_id)
            && let Some(stored) = bracket.matches.iter_mut().find(|s| s.id == m.id)
        {
            *stored = m;
        }
    }

    /// Make `record_results` alone fail as if storage timed out
    pub async fn set_results_unavailable(&self, unavailable: bool) {
        self.state.write().await.results_unavailable = unavailable;
    }

    /// Make every call fail as if storage were unreachable
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }
}

#[async_trait]
impl BracketRepository for InMemoryBracketRepository {
    async fn health_check(&self) -> BracketResult<()> {
        self.state.read().await.check_available()
    }

    async fn get_tournament(&self, tournament_id: TournamentId) -> BracketResult<Option<Tournament>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.tournaments.get(&tournament_id).cloned())
    }

    async fn list_participants(&self, tournament_id: TournamentId) -> BracketResult<Vec<Participant>> {
        let state = self.state.read().await;
        state.check_available()?;
        let mut participants = state
            .participants
            .get(&tournament_id)
            .cloned()
            .unwrap_or_default();
        for p in &mut participants {
            if let Some((elo, _)) = state.rankings.get(&p.player_id) {
                p.elo_rating = *elo;
            }
        }
        participants.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then(a.player_id.cmp(&b.player_id))
        });
        Ok(participants)
    }

    async fn load_bracket(&self, tournament_id: TournamentId) -> BracketResult<Option<GeneratedBracket>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.brackets.get(&tournament_id).cloned())
    }

    async fn tournament_for_match(&self, match_id: MatchId) -> BracketResult<Option<TournamentId>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state
            .brackets
            .values()
            .find(|b| b.matches.iter().any(|m| m.id == match_id))
            .map(|b| b.meta.tournament_id))
    }

    async fn replace_bracket(
        &self,
        bracket: &GeneratedBracket,
        status: Option<TournamentStatus>,
    ) -> BracketResult<()> {
        let mut state = self.state.write().await;
        state.check_available()?;
        let tournament_id = bracket.meta.tournament_id;
        let tournament = state.tournament_mut(tournament_id)?;
        if let Some(status) = status {
            tournament.status = status;
        }
        state.brackets.insert(tournament_id, bracket.clone());
        Ok(())
    }

    async fn apply_match_changes(
        &self,
        tournament_id: TournamentId,
        changes: &[MatchChange],
        status: Option<TournamentStatus>,
    ) -> BracketResult<()> {
        let mut state = self.state.write().await;
        state.check_available()?;
        state.tournament_mut(tournament_id)?;

        let stored = state
            .brackets
            .get(&tournament_id)
            .ok_or(BracketError::BracketNotFound(tournament_id))?;
        let mut matches = stored.matches.clone();
        for change in changes {
            let applied = matches
                .iter_mut()
                .find(|m| m.id == change.match_id())
                .is_some_and(|m| change.apply_to(m));
            if !applied {
                log::warn!(
                    "Guarded write on match {} of tournament {} failed, discarding batch",
                    change.match_id(),
                    tournament_id
                );
                return Err(BracketError::AdvancementConflict(change.match_id()));
            }
        }

        if let Some(bracket) = state.brackets.get_mut(&tournament_id) {
            bracket.matches = matches;
        }
        if let Some(status) = status {
            state.tournament_mut(tournament_id)?.status = status;
        }
        Ok(())
    }

    async fn list_results(&self, tournament_id: TournamentId) -> BracketResult<Vec<PlayerResult>> {
        let state = self.state.read().await;
        state.check_available()?;
        let mut results = state.results.get(&tournament_id).cloned().unwrap_or_default();
        results.sort_by_key(|r| (r.final_position, r.player_id));
        Ok(results)
    }

    async fn list_reward_log(&self, tournament_id: TournamentId) -> BracketResult<Vec<RewardLogEntry>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state
            .reward_log
            .iter()
            .filter(|e| e.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    async fn record_results(
        &self,
        tournament_id: TournamentId,
        results: &[PlayerResult],
    ) -> BracketResult<bool> {
        let mut state = self.state.write().await;
        state.check_available()?;
        if state.results_unavailable {
            return Err(BracketError::Timeout);
        }
        state.tournament_mut(tournament_id)?;
        if state.results.get(&tournament_id).is_some_and(|r| !r.is_empty()) {
            return Ok(false);
        }

        let now = Utc::now();
        for result in results {
            let key = RewardLogEntry::key_for(tournament_id, result.player_id);
            if state.reward_log.iter().any(|e| e.idempotency_key == key) {
                continue;
            }
            state.reward_log.push(RewardLogEntry {
                tournament_id,
                player_id: result.player_id,
                elo_change: result.elo_change,
                spa_points: result.spa_points_earned,
                idempotency_key: key,
                created_at: now,
            });
            if let Some((elo, spa)) = state.rankings.get_mut(&result.player_id) {
                *elo += result.elo_change;
                *spa += result.spa_points_earned;
            }
        }

        state.results.insert(tournament_id, results.to_vec());
        state.tournament_mut(tournament_id)?.status = TournamentStatus::Completed;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournament::{RankTier, Slot};

    fn tournament(id: TournamentId) -> Tournament {
        Tournament {
            id,
            name: "Friday 8-ball".to_string(),
            tournament_type: crate::tournament::TournamentType::SingleElimination,
            max_participants: 16,
            current_participants: 0,
            status: TournamentStatus::RegistrationClosed,
            has_third_place_match: false,
        }
    }

    fn participant(player_id: PlayerId) -> Participant {
        Participant {
            player_id,
            display_name: format!("P{player_id}"),
            elo_rating: 1200,
            rank_tier: RankTier::I,
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_participants_and_counts() {
        let repo = InMemoryBracketRepository::new();
        repo.add_tournament(tournament(1)).await;
        repo.add_participant(1, participant(10)).await;
        repo.add_participant(1, participant(11)).await;

        let t = repo.get_tournament(1).await.unwrap().unwrap();
        assert_eq!(t.current_participants, 2);
        assert_eq!(repo.list_participants(1).await.unwrap().len(), 2);
        assert_eq!(repo.ranking(10).await, Some((1200, 0)));
        assert!(repo.get_tournament(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_storage() {
        let repo = InMemoryBracketRepository::new();
        repo.set_unavailable(true).await;
        assert!(matches!(repo.health_check().await, Err(BracketError::Timeout)));
        repo.set_unavailable(false).await;
        assert!(repo.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_guard_discards_whole_batch() {
        let repo = InMemoryBracketRepository::new();
        repo.add_tournament(tournament(1)).await;

        let mut taken = Match::shell(1, 2, 1);
        taken.player1_id = Some(5);
        let open = Match::shell(1, 2, 2);
        let bracket = GeneratedBracket {
            meta: crate::tournament::BracketMeta {
                tournament_id: 1,
                tournament_type: crate::tournament::TournamentType::SingleElimination,
                bracket_size: 4,
                participant_count: 4,
                rounds: 2,
                seeding_method: crate::tournament::SeedingMethod::EloRanking,
                has_third_place_match: false,
                generated_at: Utc::now(),
            },
            seeds: Vec::new(),
            matches: vec![taken.clone(), open.clone()],
        };
        repo.replace_bracket(&bracket, None).await.unwrap();

        let changes = [
            MatchChange::SlotFilled {
                match_id: open.id,
                slot: Slot::Player1,
                player_id: 7,
            },
            MatchChange::SlotFilled {
                match_id: taken.id,
                slot: Slot::Player1,
                player_id: 6,
            },
        ];
        let err = repo
            .apply_match_changes(1, &changes, Some(TournamentStatus::Ongoing))
            .await
            .unwrap_err();
        assert!(matches!(err, BracketError::AdvancementConflict(id) if id == taken.id));

        let stored = repo.load_bracket(1).await.unwrap().unwrap();
        assert!(stored.matches.iter().all(|m| m.id != open.id || m.player1_id.is_none()));
        let t = repo.get_tournament(1).await.unwrap().unwrap();
        assert_eq!(t.status, TournamentStatus::RegistrationClosed);
    }
}
