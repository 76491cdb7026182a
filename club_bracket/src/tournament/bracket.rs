//! In-memory bracket: the bracket meta plus every match of one tournament.

use serde::{Deserialize, Serialize};

use super::models::{BracketMeta, Match, MatchId, PlayerId, TournamentId};

/// Complete bracket state for one tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    pub meta: BracketMeta,
    /// Sorted by round, then match number; the third-place match sorts last
    pub matches: Vec<Match>,
}

impl Bracket {
    pub fn new(meta: BracketMeta, mut matches: Vec<Match>) -> Self {
        matches.sort_by_key(|m| (m.is_third_place_match, m.round_number, m.match_number));
        Self { meta, matches }
    }

    pub fn tournament_id(&self) -> TournamentId {
        self.meta.tournament_id
    }

    pub fn rounds(&self) -> u32 {
        self.meta.rounds
    }

    pub fn get(&self, match_id: MatchId) -> Option<&Match> {
        self.matches.iter().find(|m| m.id == match_id)
    }

    pub(crate) fn index_of(&self, match_id: MatchId) -> Option<usize> {
        self.matches.iter().position(|m| m.id == match_id)
    }

    /// Index of a main-draw match
    pub(crate) fn index_at(&self, round_number: u32, match_number: u32) -> Option<usize> {
        self.matches.iter().position(|m| {
            !m.is_third_place_match
                && m.round_number == round_number
                && m.match_number == match_number
        })
    }

    pub(crate) fn third_place_index(&self) -> Option<usize> {
        self.matches.iter().position(|m| m.is_third_place_match)
    }

    /// Main-draw matches of one round
    pub fn round(&self, round_number: u32) -> Vec<&Match> {
        self.matches
            .iter()
            .filter(|m| !m.is_third_place_match && m.round_number == round_number)
            .collect()
    }

    pub fn final_match(&self) -> Option<&Match> {
        self.index_at(self.rounds(), 1).map(|i| &self.matches[i])
    }

    pub fn third_place_match(&self) -> Option<&Match> {
        self.third_place_index().map(|i| &self.matches[i])
    }

    /// The two semifinals, empty for a one-round bracket
    pub fn semifinals(&self) -> Vec<&Match> {
        if self.rounds() < 2 {
            return Vec::new();
        }
        self.round(self.rounds() - 1)
    }

    pub fn is_final(&self, m: &Match) -> bool {
        !m.is_third_place_match && m.round_number == self.rounds() && m.match_number == 1
    }

    pub fn is_semifinal(&self, m: &Match) -> bool {
        self.rounds() >= 2 && !m.is_third_place_match && m.round_number == self.rounds() - 1
    }

    /// Final decided, and the third-place match too when there is one
    pub fn is_complete(&self) -> bool {
        let final_done = self.final_match().is_some_and(Match::is_completed);
        let third_done = self.third_place_match().is_none_or(Match::is_completed);
        final_done && third_done
    }

    pub fn champion(&self) -> Option<PlayerId> {
        self.final_match()
            .filter(|m| m.is_completed())
            .and_then(|m| m.winner_id)
    }

    /// Completed matches that were actually played (byes and walkovers excluded)
    pub fn played_match_count(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.is_completed() && !m.is_bye())
            .count()
    }
}
