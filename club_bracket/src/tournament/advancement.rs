//! Match advancement state machine.
//!
//! Matches move `scheduled -> in_progress -> completed`; `in_progress` is
//! optional. Every transition is expressed as a [`MatchChange`] so that the
//! caller can persist exactly what changed, with the same guards the
//! in-memory transition applied.
//!
//! Advancement wiring: the winner of round `r` match `m` moves to round `r+1`
//! match `ceil(m/2)`, into `player1` when `m` is odd and `player2` when even.
//! Once both semifinals are decided their losers fill the third-place match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bracket::Bracket;
use super::errors::{BracketError, BracketResult};
use super::models::{AdvancementOutcome, Match, MatchId, MatchStatus, PlayerId, Slot};

/// Highest score a result may carry; scores are stored as `INTEGER`
pub const MAX_SCORE: u32 = i32::MAX as u32;

/// One guarded write to a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchChange {
    /// `scheduled -> in_progress`
    Started {
        match_id: MatchId,
        started_at: DateTime<Utc>,
    },
    /// `* -> completed`; scores are absent for byes and walkovers
    Completed {
        match_id: MatchId,
        winner_id: PlayerId,
        score_player1: Option<u32>,
        score_player2: Option<u32>,
        completed_at: DateTime<Utc>,
    },
    /// Player written into an empty slot
    SlotFilled {
        match_id: MatchId,
        slot: Slot,
        player_id: PlayerId,
    },
}

impl MatchChange {
    pub fn match_id(&self) -> MatchId {
        match self {
            MatchChange::Started { match_id, .. }
            | MatchChange::Completed { match_id, .. }
            | MatchChange::SlotFilled { match_id, .. } => *match_id,
        }
    }

    /// Apply the change if its guard holds, returning `false` otherwise
    ///
    /// Guards: `Started` needs a scheduled match, `Completed` a match that is
    /// not yet completed, `SlotFilled` an empty slot or one already holding the
    /// same player.
    pub fn apply_to(&self, m: &mut Match) -> bool {
        match self {
            MatchChange::Started { started_at, .. } => {
                if m.status != MatchStatus::Scheduled {
                    return false;
                }
                m.status = MatchStatus::InProgress;
                m.started_at = Some(*started_at);
            }
            MatchChange::Completed {
                winner_id,
                score_player1,
                score_player2,
                completed_at,
                ..
            } => {
                if m.is_completed() {
                    return false;
                }
                m.status = MatchStatus::Completed;
                m.winner_id = Some(*winner_id);
                m.score_player1 = *score_player1;
                m.score_player2 = *score_player2;
                m.completed_at = Some(*completed_at);
            }
            MatchChange::SlotFilled {
                slot, player_id, ..
            } => match m.slot(*slot) {
                Some(existing) if existing == *player_id => {}
                Some(_) => return false,
                None => m.set_slot(*slot, *player_id),
            },
        }
        true
    }
}

/// Outcome of a transition plus the writes that realise it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advancement {
    pub outcome: AdvancementOutcome,
    pub changes: Vec<MatchChange>,
}

/// Mark a match as in progress
///
/// # Errors
///
/// * `BracketError::MatchNotFound` - match is not part of this bracket
/// * `BracketError::InvalidMatchState` - already started or completed, or a player is missing
pub fn start_match(
    bracket: &mut Bracket,
    match_id: MatchId,
    now: DateTime<Utc>,
) -> BracketResult<MatchChange> {
    let idx = bracket
        .index_of(match_id)
        .ok_or(BracketError::MatchNotFound(match_id))?;
    let m = &bracket.matches[idx];

    match m.status {
        MatchStatus::Completed => {
            return Err(BracketError::invalid_match(match_id, "match already completed"));
        }
        MatchStatus::InProgress => {
            return Err(BracketError::invalid_match(match_id, "match already in progress"));
        }
        MatchStatus::Scheduled => {}
    }
    if !m.has_both_players() {
        return Err(BracketError::invalid_match(
            match_id,
            "both players must be assigned before the match starts",
        ));
    }

    let change = MatchChange::Started {
        match_id,
        started_at: now,
    };
    let mut changes = Vec::with_capacity(1);
    apply(bracket, change.clone(), &mut changes)?;
    Ok(change)
}

/// Record a match result and advance the winner
///
/// # Errors
///
/// * `BracketError::MatchNotFound` - match is not part of this bracket
/// * `BracketError::InvalidMatchState` - already completed, a player is missing,
///   or the winner is not one of the two players
/// * `BracketError::AdvancementConflict` - the next-round slot holds another player
pub fn report_result(
    bracket: &mut Bracket,
    match_id: MatchId,
    winner_id: PlayerId,
    score_player1: u32,
    score_player2: u32,
    now: DateTime<Utc>,
) -> BracketResult<Advancement> {
    let idx = bracket
        .index_of(match_id)
        .ok_or(BracketError::MatchNotFound(match_id))?;
    let m = &bracket.matches[idx];

    if m.is_completed() {
        return Err(BracketError::invalid_match(match_id, "match already completed"));
    }
    let (Some(player1), Some(player2)) = (m.player1_id, m.player2_id) else {
        return Err(BracketError::invalid_match(
            match_id,
            "both players must be assigned before reporting a result",
        ));
    };
    if winner_id != player1 && winner_id != player2 {
        return Err(BracketError::invalid_match(
            match_id,
            format!("winner {winner_id} is not a player in this match"),
        ));
    }
    if score_player1 > MAX_SCORE || score_player2 > MAX_SCORE {
        return Err(BracketError::invalid_match(
            match_id,
            format!("scores must be between 0 and {MAX_SCORE}"),
        ));
    }

    let mut changes = Vec::new();
    apply(
        bracket,
        MatchChange::Completed {
            match_id,
            winner_id,
            score_player1: Some(score_player1),
            score_player2: Some(score_player2),
            completed_at: now,
        },
        &mut changes,
    )?;

    advance_from(bracket, idx, now, changes)
}

/// Re-run advancement for a match whose result is already recorded
///
/// Writes only what is missing, so calling it repeatedly is harmless.
///
/// # Errors
///
/// * `BracketError::MatchNotFound` - match is not part of this bracket
/// * `BracketError::InvalidMatchState` - the match has no result yet
/// * `BracketError::AdvancementConflict` - a downstream slot holds another player
pub fn advance_winner(
    bracket: &mut Bracket,
    match_id: MatchId,
    now: DateTime<Utc>,
) -> BracketResult<Advancement> {
    let idx = bracket
        .index_of(match_id)
        .ok_or(BracketError::MatchNotFound(match_id))?;
    let m = &bracket.matches[idx];
    if !m.is_completed() || m.winner_id.is_none() {
        return Err(BracketError::invalid_match(match_id, "match has no recorded result"));
    }

    advance_from(bracket, idx, now, Vec::new())
}

fn advance_from(
    bracket: &mut Bracket,
    idx: usize,
    now: DateTime<Utc>,
    mut changes: Vec<MatchChange>,
) -> BracketResult<Advancement> {
    let completed = bracket.matches[idx].clone();
    let winner_id = completed
        .winner_id
        .ok_or_else(|| BracketError::invalid_match(completed.id, "match has no winner"))?;

    let next = if !completed.is_third_place_match && completed.round_number < bracket.rounds() {
        Some(propagate_winner(bracket, idx, &mut changes)?)
    } else {
        None
    };

    let third_place_ready = if bracket.is_semifinal(&completed) {
        wire_third_place(bracket, now, &mut changes)?
    } else {
        false
    };

    let tournament_complete = bracket.is_complete();
    if tournament_complete {
        log::info!(
            "Tournament {} complete, champion {:?}",
            bracket.tournament_id(),
            bracket.champion()
        );
    }

    Ok(Advancement {
        outcome: AdvancementOutcome {
            match_id: completed.id,
            winner_id,
            loser_id: completed.loser_id(),
            tournament_complete,
            next_round: next.map(|(round, _)| round),
            next_match_number: next.map(|(_, number)| number),
            third_place_ready,
            final_results: None,
        },
        changes,
    })
}

/// Write the winner of `bracket.matches[idx]` into its next-round slot
///
/// Returns the target round and match number.
pub(crate) fn propagate_winner(
    bracket: &mut Bracket,
    idx: usize,
    changes: &mut Vec<MatchChange>,
) -> BracketResult<(u32, u32)> {
    let source = &bracket.matches[idx];
    let winner_id = source
        .winner_id
        .ok_or_else(|| BracketError::invalid_match(source.id, "match has no winner"))?;
    let target_round = source.round_number + 1;
    let target_number = source.match_number.div_ceil(2);
    let slot = Slot::for_feeder(source.match_number);

    let target_idx = bracket.index_at(target_round, target_number).ok_or_else(|| {
        BracketError::InvalidData(format!(
            "bracket for tournament {} has no round {target_round} match {target_number}",
            bracket.tournament_id()
        ))
    })?;

    fill_slot(bracket, target_idx, slot, winner_id, changes)?;
    Ok((target_round, target_number))
}

/// Seat both semifinal losers in the third-place match
///
/// A semifinal decided by a bye has no loser; when only one player can be
/// seated the third-place match is resolved as a walkover. Returns whether
/// the match is now ready to be played.
fn wire_third_place(
    bracket: &mut Bracket,
    now: DateTime<Utc>,
    changes: &mut Vec<MatchChange>,
) -> BracketResult<bool> {
    let Some(tp_idx) = bracket.third_place_index() else {
        return Ok(false);
    };

    let semifinals = bracket.semifinals();
    if semifinals.len() != 2 || !semifinals.iter().all(|m| m.is_completed()) {
        return Ok(false);
    }
    let losers = [semifinals[0].loser_id(), semifinals[1].loser_id()];

    for (slot, loser) in [Slot::Player1, Slot::Player2].into_iter().zip(losers) {
        if let Some(player_id) = loser {
            fill_slot(bracket, tp_idx, slot, player_id, changes)?;
        }
    }

    let third_place = &bracket.matches[tp_idx];
    if third_place.is_completed() {
        return Ok(false);
    }
    match (third_place.player1_id, third_place.player2_id) {
        (Some(_), Some(_)) => Ok(true),
        (Some(player_id), None) | (None, Some(player_id)) => {
            let match_id = third_place.id;
            log::info!(
                "Third-place match {match_id} of tournament {} awarded to {player_id} by walkover",
                bracket.tournament_id()
            );
            apply(
                bracket,
                MatchChange::Completed {
                    match_id,
                    winner_id: player_id,
                    score_player1: None,
                    score_player2: None,
                    completed_at: now,
                },
                changes,
            )?;
            Ok(false)
        }
        (None, None) => Ok(false),
    }
}

fn fill_slot(
    bracket: &mut Bracket,
    idx: usize,
    slot: Slot,
    player_id: PlayerId,
    changes: &mut Vec<MatchChange>,
) -> BracketResult<()> {
    let target = &bracket.matches[idx];
    match target.slot(slot) {
        Some(existing) if existing == player_id => Ok(()),
        Some(existing) => {
            log::warn!(
                "Slot {:?} of match {} already holds {existing}, refusing {player_id}",
                slot,
                target.id
            );
            Err(BracketError::AdvancementConflict(target.id))
        }
        None => {
            let match_id = target.id;
            apply(
                bracket,
                MatchChange::SlotFilled {
                    match_id,
                    slot,
                    player_id,
                },
                changes,
            )
        }
    }
}

fn apply(
    bracket: &mut Bracket,
    change: MatchChange,
    changes: &mut Vec<MatchChange>,
) -> BracketResult<()> {
    let match_id = change.match_id();
    let idx = bracket
        .index_of(match_id)
        .ok_or(BracketError::MatchNotFound(match_id))?;
    if !change.apply_to(&mut bracket.matches[idx]) {
        return Err(BracketError::AdvancementConflict(match_id));
    }
    changes.push(change);
    Ok(())
}
