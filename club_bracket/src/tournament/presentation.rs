//! Read-only views of a bracket for clients and operators.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::models::{BracketMeta, Match, PlayerId};

/// Display name of a round, counted from the first round
pub fn round_label(round: u32, rounds: u32) -> String {
    if round == 0 || round > rounds {
        return format!("Round {round}");
    }
    match rounds - round {
        0 => "Final".to_string(),
        1 => "Semifinals".to_string(),
        2 => "Quarterfinals".to_string(),
        remaining => format!("Round of {}", 1u64 << (remaining + 1)),
    }
}

/// One round of the main draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundView {
    pub round_number: u32,
    pub label: String,
    pub matches: Vec<Match>,
}

/// Bracket laid out for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketView {
    pub meta: BracketMeta,
    pub rounds: Vec<RoundView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub third_place_match: Option<Match>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub champion: Option<PlayerId>,
}

impl BracketView {
    pub fn build(meta: &BracketMeta, matches: &[Match]) -> Self {
        let mut by_round: BTreeMap<u32, Vec<Match>> = BTreeMap::new();
        let mut third_place_match = None;
        for m in matches {
            if m.is_third_place_match {
                third_place_match = Some(m.clone());
            } else {
                by_round.entry(m.round_number).or_default().push(m.clone());
            }
        }

        let champion = by_round
            .get(&meta.rounds)
            .and_then(|finals| finals.iter().find(|m| m.match_number == 1))
            .filter(|m| m.is_completed())
            .and_then(|m| m.winner_id);

        let rounds = by_round
            .into_iter()
            .map(|(round_number, mut matches)| {
                matches.sort_by_key(|m| m.match_number);
                RoundView {
                    round_number,
                    label: round_label(round_number, meta.rounds),
                    matches,
                }
            })
            .collect();

        Self {
            meta: meta.clone(),
            rounds,
            third_place_match,
            champion,
        }
    }
}

/// Size check for one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundCount {
    pub round_number: u32,
    pub expected: u32,
    pub actual: u32,
}

/// Stored bracket compared against the shape its meta describes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureReport {
    pub valid: bool,
    pub expected_matches: u32,
    pub actual_matches: u32,
    pub rounds: Vec<RoundCount>,
    pub has_third_place_match: bool,
    pub issues: Vec<String>,
}

pub fn verify_structure(meta: &BracketMeta, matches: &[Match]) -> StructureReport {
    let mut issues = Vec::new();

    let mut rounds = Vec::with_capacity(meta.rounds as usize);
    for round_number in 1..=meta.rounds {
        let expected = meta.bracket_size >> round_number;
        let actual = matches
            .iter()
            .filter(|m| !m.is_third_place_match && m.round_number == round_number)
            .count() as u32;
        if actual != expected {
            issues.push(format!(
                "{} has {actual} match(es), expected {expected}",
                round_label(round_number, meta.rounds)
            ));
        }
        rounds.push(RoundCount {
            round_number,
            expected,
            actual,
        });
    }

    let stray = matches
        .iter()
        .filter(|m| m.round_number == 0 || m.round_number > meta.rounds)
        .count();
    if stray > 0 {
        issues.push(format!("{stray} match(es) outside rounds 1..={}", meta.rounds));
    }

    let third_place_count = matches.iter().filter(|m| m.is_third_place_match).count();
    let wants_third_place = meta.has_third_place_match && meta.rounds >= 2;
    match (wants_third_place, third_place_count) {
        (true, 0) => issues.push("third-place match missing".to_string()),
        (false, n) if n > 0 => issues.push("unexpected third-place match".to_string()),
        (_, n) if n > 1 => issues.push(format!("{n} third-place matches")),
        _ => {}
    }

    let mut seen = BTreeMap::new();
    for m in matches {
        *seen
            .entry((m.is_third_place_match, m.round_number, m.match_number))
            .or_insert(0u32) += 1;
    }
    for ((third_place, round, number), count) in seen {
        if count > 1 && !third_place {
            issues.push(format!("round {round} match {number} appears {count} times"));
        }
    }

    let expected_matches = meta.expected_match_count();
    let actual_matches = matches.len() as u32;
    if actual_matches != expected_matches {
        issues.push(format!(
            "bracket has {actual_matches} match(es), expected {expected_matches}"
        ));
    }

    StructureReport {
        valid: issues.is_empty(),
        expected_matches,
        actual_matches,
        rounds,
        has_third_place_match: third_place_count > 0,
        issues,
    }
}

/// Matches with both players known and no result, in bracket order
pub fn pending_matches(matches: &[Match]) -> Vec<&Match> {
    let mut pending: Vec<&Match> = matches.iter().filter(|m| m.is_ready()).collect();
    pending.sort_by_key(|m| (m.round_number, m.is_third_place_match, m.match_number));
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournament::builder::generate_bracket;
    use crate::tournament::models::{GeneratedBracket, Seed, SeedingMethod, TournamentType};

    fn generated(count: u32, third_place: bool) -> GeneratedBracket {
        let size = count.next_power_of_two();
        let seeds = (1..=size)
            .map(|position| Seed {
                tournament_id: 1,
                seed_position: position,
                player_id: (position <= count).then_some(i64::from(position)),
                elo_rating: None,
            })
            .collect();
        generate_bracket(
            1,
            TournamentType::SingleElimination,
            seeds,
            SeedingMethod::RegistrationOrder,
            third_place,
        )
        .unwrap()
    }

    #[test]
    fn test_round_labels() {
        assert_eq!(round_label(5, 5), "Final");
        assert_eq!(round_label(4, 5), "Semifinals");
        assert_eq!(round_label(3, 5), "Quarterfinals");
        assert_eq!(round_label(2, 5), "Round of 16");
        assert_eq!(round_label(1, 5), "Round of 32");
        assert_eq!(round_label(1, 1), "Final");
        assert_eq!(round_label(6, 5), "Round 6");
        assert_eq!(round_label(0, 5), "Round 0");
    }

    #[test]
    fn test_view_groups_rounds() {
        let g = generated(8, true);
        let view = BracketView::build(&g.meta, &g.matches);
        assert_eq!(view.rounds.len(), 3);
        assert_eq!(view.rounds[0].label, "Quarterfinals");
        assert_eq!(view.rounds[0].matches.len(), 4);
        assert_eq!(view.rounds[2].label, "Final");
        assert_eq!(view.rounds[2].matches.len(), 1);
        assert!(view.third_place_match.is_some());
        assert_eq!(view.champion, None);
    }

    #[test]
    fn test_verify_valid_bracket() {
        let g = generated(5, true);
        let report = verify_structure(&g.meta, &g.matches);
        assert!(report.valid, "{:?}", report.issues);
        assert_eq!(report.expected_matches, 8);
        assert_eq!(report.actual_matches, 8);
        assert!(report.has_third_place_match);
    }

    #[test]
    fn test_verify_flags_missing_and_extra() {
        let g = generated(8, false);
        let mut matches = g.matches.clone();
        matches.retain(|m| !(m.round_number == 2 && m.match_number == 2));
        let report = verify_structure(&g.meta, &matches);
        assert!(!report.valid);
        assert_eq!(report.actual_matches, 6);
        assert!(report.issues.iter().any(|i| i.contains("Semifinals")));

        let mut extra = g.matches.clone();
        extra.push(Match::shell(1, 4, 1));
        let report = verify_structure(&g.meta, &extra);
        assert!(!report.valid);
        assert!(report.issues.iter().any(|i| i.contains("outside rounds")));
    }

    #[test]
    fn test_pending_matches_excludes_byes() {
        let g = generated(5, false);
        let pending = pending_matches(&g.matches);
        // Only seed 4 vs seed 5 and seed 2 vs seed 3 are playable
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].round_number, 1);
        assert_eq!(pending[1].round_number, 2);
    }
}
