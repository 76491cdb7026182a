//! Bracket manager: orchestrates seeding, generation, advancement and
//! finalization against a [`BracketRepository`].
//!
//! Every mutating operation holds a per-tournament async mutex for its whole
//! read-compute-write cycle, so two results for the same tournament are never
//! computed from the same snapshot inside one process. Across processes the
//! repository's row lock and guarded writes take over.

use chrono::Utc;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::advancement;
use super::bracket::Bracket;
use super::builder;
use super::errors::{BracketError, BracketResult};
use super::models::{
    AdvancementOutcome, FinalizeOutcome, GenerateBracketRequest, GenerateOutcome,
    GeneratedBracket, GenerationCheck, Match, MatchId, PlayerId, PlayerResult, Tournament,
    TournamentId, TournamentStatus,
};
use super::presentation::{self, BracketView, StructureReport};
use super::rewards::RewardPolicy;
use super::seeding::assign_seeds;
use super::standings::compute_standings;
use crate::db::BracketRepository;

/// Bracket lifecycle manager
#[derive(Clone)]
pub struct BracketManager {
    repo: Arc<dyn BracketRepository>,
    policy: Arc<RewardPolicy>,
    locks: Arc<RwLock<HashMap<TournamentId, Arc<Mutex<()>>>>>,
}

impl BracketManager {
    pub fn new(repo: Arc<dyn BracketRepository>, policy: Arc<RewardPolicy>) -> Self {
        Self {
            repo,
            policy,
            locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn policy(&self) -> &RewardPolicy {
        &self.policy
    }

    pub async fn health_check(&self) -> BracketResult<()> {
        self.repo.health_check().await
    }

    /// Check whether a bracket can be generated, without changing anything
    pub async fn can_generate(&self, tournament_id: TournamentId) -> BracketResult<GenerationCheck> {
        let tournament = self.tournament(tournament_id).await?;
        let participants = self.repo.list_participants(tournament_id).await?;
        let bracket_exists = self.repo.load_bracket(tournament_id).await?.is_some();
        let has_results = !self.repo.list_results(tournament_id).await?.is_empty();

        let reason = generation_blocker(&tournament, participants.len(), has_results);
        Ok(GenerationCheck {
            valid: reason.is_none(),
            reason,
            participant_count: participants.len() as u32,
            bracket_exists,
            tournament_type: tournament.tournament_type,
        })
    }

    /// Seed the confirmed participants and store a fresh bracket
    ///
    /// # Errors
    ///
    /// * `BracketError::BracketAlreadyExists` - a bracket exists and `force_regenerate` is off
    /// * `BracketError::RegenerationBlocked` - played matches would be lost without `confirm_data_loss`
    /// * `BracketError::InvalidTournamentStatus` - tournament cancelled or already finalized
    /// * `BracketError::InvalidParticipantCount` - fewer than two participants
    pub async fn generate_bracket(
        &self,
        tournament_id: TournamentId,
        request: GenerateBracketRequest,
    ) -> BracketResult<GenerateOutcome> {
        let _guard = self.lock(tournament_id).await;

        let tournament = self.tournament(tournament_id).await?;
        if !tournament.tournament_type.is_supported() {
            return Err(BracketError::UnsupportedTournamentType(
                tournament.tournament_type,
            ));
        }
        if tournament.status == TournamentStatus::Cancelled {
            return Err(BracketError::InvalidTournamentStatus {
                status: tournament.status,
                reason: "cannot generate a bracket for a cancelled tournament".to_string(),
            });
        }
        if !self.repo.list_results(tournament_id).await?.is_empty() {
            return Err(BracketError::InvalidTournamentStatus {
                status: tournament.status,
                reason: "results are already recorded".to_string(),
            });
        }

        let existing = self.repo.load_bracket(tournament_id).await?;
        if let Some(existing) = &existing {
            if !request.force_regenerate {
                return Err(BracketError::BracketAlreadyExists(tournament_id));
            }
            let played = Bracket::new(existing.meta.clone(), existing.matches.clone())
                .played_match_count();
            if played > 0 {
                if !request.confirm_data_loss {
                    return Err(BracketError::RegenerationBlocked { completed: played });
                }
                log::warn!(
                    "Regenerating bracket for tournament {tournament_id}, discarding {played} played match(es)"
                );
            }
        }

        let participants = self.repo.list_participants(tournament_id).await?;
        let seeds = assign_seeds(
            tournament_id,
            &participants,
            request.seeding_method,
            request.random_seed,
        )?;
        let generated = builder::generate_bracket(
            tournament_id,
            tournament.tournament_type,
            seeds,
            request.seeding_method,
            tournament.has_third_place_match,
        )?;

        self.repo
            .replace_bracket(&generated, restart_status(tournament.status))
            .await?;

        let meta = &generated.meta;
        log::info!(
            "Bracket {} for tournament {}: {} matches, seeding {}",
            if existing.is_some() { "regenerated" } else { "generated" },
            tournament_id,
            generated.matches.len(),
            meta.seeding_method
        );

        Ok(GenerateOutcome {
            participant_count: meta.participant_count,
            matches_created: generated.matches.len() as u32,
            rounds: meta.rounds,
            bracket_size: meta.bracket_size,
            byes: meta.byes(),
            regenerated: existing.is_some(),
        })
    }

    pub async fn get_bracket(&self, tournament_id: TournamentId) -> BracketResult<Bracket> {
        let stored = self.load(tournament_id).await?;
        Ok(Bracket::new(stored.meta, stored.matches))
    }

    pub async fn bracket_view(&self, tournament_id: TournamentId) -> BracketResult<BracketView> {
        let stored = self.load(tournament_id).await?;
        Ok(BracketView::build(&stored.meta, &stored.matches))
    }

    pub async fn verify_bracket(&self, tournament_id: TournamentId) -> BracketResult<StructureReport> {
        let stored = self.load(tournament_id).await?;
        let report = presentation::verify_structure(&stored.meta, &stored.matches);
        if !report.valid {
            log::warn!(
                "Bracket for tournament {} failed verification: {}",
                tournament_id,
                report.issues.join("; ")
            );
        }
        Ok(report)
    }

    /// Matches ready to be played
    pub async fn pending_matches(&self, tournament_id: TournamentId) -> BracketResult<Vec<Match>> {
        let stored = self.load(tournament_id).await?;
        Ok(presentation::pending_matches(&stored.matches)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Move a scheduled match with both players to in progress
    pub async fn start_match(&self, match_id: MatchId) -> BracketResult<Match> {
        let tournament_id = self.tournament_of(match_id).await?;
        let _guard = self.lock(tournament_id).await;

        let tournament = self.tournament(tournament_id).await?;
        ensure_playable(&tournament)?;

        let mut bracket = self.get_bracket(tournament_id).await?;
        let change = advancement::start_match(&mut bracket, match_id, Utc::now())?;
        self.repo
            .apply_match_changes(tournament_id, &[change], None)
            .await?;

        bracket
            .get(match_id)
            .cloned()
            .ok_or(BracketError::MatchNotFound(match_id))
    }

    /// Record a result, advance the winner and finalize if this ends the tournament
    ///
    /// # Errors
    ///
    /// * `BracketError::InvalidMatchState` - match already completed, players missing or winner invalid
    /// * `BracketError::AdvancementConflict` - concurrent writer changed the bracket; retry
    pub async fn report_result(
        &self,
        match_id: MatchId,
        winner_id: PlayerId,
        score_player1: u32,
        score_player2: u32,
    ) -> BracketResult<AdvancementOutcome> {
        let tournament_id = self.tournament_of(match_id).await?;
        let _guard = self.lock(tournament_id).await;

        let tournament = self.tournament(tournament_id).await?;
        ensure_playable(&tournament)?;

        let stored = self.load(tournament_id).await?;
        let mut bracket = Bracket::new(stored.meta.clone(), stored.matches.clone());
        let advancement::Advancement { mut outcome, changes } = advancement::report_result(
            &mut bracket,
            match_id,
            winner_id,
            score_player1,
            score_player2,
            Utc::now(),
        )?;

        // Completed is written together with the results
        let status = (tournament.status != TournamentStatus::Ongoing)
            .then_some(TournamentStatus::Ongoing);
        self.repo
            .apply_match_changes(tournament_id, &changes, status)
            .await?;

        log::info!(
            "Match {} of tournament {}: {} beat {:?} {}-{}",
            match_id,
            tournament_id,
            outcome.winner_id,
            outcome.loser_id,
            score_player1,
            score_player2
        );

        if outcome.tournament_complete {
            let completed = GeneratedBracket {
                meta: bracket.meta,
                seeds: stored.seeds,
                matches: bracket.matches,
            };
            // The result itself is stored; finalization can be retried on its own
            match self.finalize_locked(tournament_id, &completed).await {
                Ok(finalized) => outcome.final_results = Some(finalized.results),
                Err(err) => log::warn!(
                    "Final of tournament {tournament_id} recorded but finalization failed: {err}"
                ),
            }
        }

        Ok(outcome)
    }

    /// Re-run advancement for an already-completed match
    ///
    /// Fills whatever downstream slots are missing and finalizes a completed
    /// tournament that has no results yet. Safe to call repeatedly.
    pub async fn advance_winner(
        &self,
        match_id: MatchId,
        tournament_id: TournamentId,
    ) -> BracketResult<AdvancementOutcome> {
        let _guard = self.lock(tournament_id).await;

        let stored = self.load(tournament_id).await?;
        let mut bracket = Bracket::new(stored.meta.clone(), stored.matches.clone());
        if bracket.get(match_id).is_none() {
            return Err(BracketError::MatchNotFound(match_id));
        }

        let advancement::Advancement { mut outcome, changes } =
            advancement::advance_winner(&mut bracket, match_id, Utc::now())?;

        if !changes.is_empty() {
            log::info!(
                "Repaired {} slot(s) downstream of match {} in tournament {}",
                changes.len(),
                match_id,
                tournament_id
            );
            self.repo
                .apply_match_changes(tournament_id, &changes, None)
                .await?;
        }

        if outcome.tournament_complete {
            let finalized = self
                .finalize_locked(
                    tournament_id,
                    &GeneratedBracket {
                        meta: bracket.meta,
                        seeds: stored.seeds,
                        matches: bracket.matches,
                    },
                )
                .await?;
            outcome.final_results = Some(finalized.results);
        }

        Ok(outcome)
    }

    /// Compute, store and award final standings; a repeat call returns the stored ones
    ///
    /// # Errors
    ///
    /// * `BracketError::TournamentNotComplete` - final or third-place match still open
    pub async fn finalize_tournament(
        &self,
        tournament_id: TournamentId,
    ) -> BracketResult<FinalizeOutcome> {
        let _guard = self.lock(tournament_id).await;
        let stored = self.load(tournament_id).await?;
        self.finalize_locked(tournament_id, &stored).await
    }

    /// Stored final standings
    pub async fn get_results(&self, tournament_id: TournamentId) -> BracketResult<Vec<PlayerResult>> {
        self.tournament(tournament_id).await?;
        self.repo.list_results(tournament_id).await
    }

    async fn finalize_locked(
        &self,
        tournament_id: TournamentId,
        stored: &GeneratedBracket,
    ) -> BracketResult<FinalizeOutcome> {
        let existing = self.repo.list_results(tournament_id).await?;
        if !existing.is_empty() {
            log::info!("Tournament {tournament_id} already finalized, returning stored results");
            return Ok(FinalizeOutcome {
                results: existing,
                already_finalized: true,
            });
        }

        let bracket = Bracket::new(stored.meta.clone(), stored.matches.clone());
        let participants = self.repo.list_participants(tournament_id).await?;
        let recorded = self
            .repo
            .list_reward_log(tournament_id)
            .await?
            .into_iter()
            .map(|entry| (entry.player_id, entry))
            .collect();
        let results = compute_standings(
            &bracket,
            &stored.seeds,
            &participants,
            &self.policy,
            &recorded,
        )?;

        if self.repo.record_results(tournament_id, &results).await? {
            log::info!(
                "Finalized tournament {}: champion {:?}, {} result(s) recorded",
                tournament_id,
                bracket.champion(),
                results.len()
            );
            Ok(FinalizeOutcome {
                results,
                already_finalized: false,
            })
        } else {
            Ok(FinalizeOutcome {
                results: self.repo.list_results(tournament_id).await?,
                already_finalized: true,
            })
        }
    }

    async fn lock(&self, tournament_id: TournamentId) -> OwnedMutexGuard<()> {
        let existing = self.locks.read().await.get(&tournament_id).cloned();
        let lock = match existing {
            Some(lock) => lock,
            None => self
                .locks
                .write()
                .await
                .entry(tournament_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone(),
        };
        lock.lock_owned().await
    }

    async fn tournament(&self, tournament_id: TournamentId) -> BracketResult<Tournament> {
        self.repo
            .get_tournament(tournament_id)
            .await?
            .ok_or(BracketError::TournamentNotFound(tournament_id))
    }

    async fn tournament_of(&self, match_id: MatchId) -> BracketResult<TournamentId> {
        self.repo
            .tournament_for_match(match_id)
            .await?
            .ok_or(BracketError::MatchNotFound(match_id))
    }

    async fn load(&self, tournament_id: TournamentId) -> BracketResult<GeneratedBracket> {
        self.repo
            .load_bracket(tournament_id)
            .await?
            .ok_or(BracketError::BracketNotFound(tournament_id))
    }
}

/// Reason generation is not allowed, if any
fn generation_blocker(
    tournament: &Tournament,
    participant_count: usize,
    has_results: bool,
) -> Option<String> {
    if !tournament.tournament_type.is_supported() {
        return Some(format!(
            "tournament type {} is not supported",
            tournament.tournament_type
        ));
    }
    if tournament.status == TournamentStatus::Cancelled {
        return Some("tournament is cancelled".to_string());
    }
    if has_results {
        return Some("results are already recorded".to_string());
    }
    if participant_count < 2 {
        return Some(format!(
            "need at least 2 participants, have {participant_count}"
        ));
    }
    None
}

/// Status to write when a bracket is (re)generated; play restarts from scratch
///
/// Only reached without recorded results, so a `Completed` status here is
/// left over from an interrupted finalization.
fn restart_status(status: TournamentStatus) -> Option<TournamentStatus> {
    match status {
        TournamentStatus::Ongoing | TournamentStatus::Completed => {
            Some(TournamentStatus::RegistrationClosed)
        }
        _ => None,
    }
}

fn ensure_playable(tournament: &Tournament) -> BracketResult<()> {
    match tournament.status {
        TournamentStatus::Cancelled | TournamentStatus::Completed => {
            Err(BracketError::InvalidTournamentStatus {
                status: tournament.status,
                reason: "matches can no longer be played".to_string(),
            })
        }
        _ => Ok(()),
    }
}
