//! Single-elimination bracket construction.

use chrono::Utc;

use super::advancement::{MatchChange, propagate_winner};
use super::bracket::Bracket;
use super::errors::{BracketError, BracketResult};
use super::models::{
    BracketMeta, GeneratedBracket, Match, Seed, SeedingMethod, TournamentId, TournamentType,
};
use super::seeding::{bracket_size_for, round_one_pairs};

/// Build every match of a single-elimination bracket from assigned seeds
///
/// Round one pairs seeds in standard bracket order; later rounds start as
/// empty shells. A round-one match against a bye is completed immediately and
/// its player is advanced. With `has_third_place_match` and at least two
/// rounds, an extra match is added in the final round with match number 2.
///
/// # Errors
///
/// * `BracketError::UnsupportedTournamentType` - format other than single elimination
/// * `BracketError::InvalidParticipantCount` - fewer than two real players
/// * `BracketError::InvalidData` - seed positions are not dense from 1
pub fn generate_bracket(
    tournament_id: TournamentId,
    tournament_type: TournamentType,
    mut seeds: Vec<Seed>,
    seeding_method: SeedingMethod,
    has_third_place_match: bool,
) -> BracketResult<GeneratedBracket> {
    if !tournament_type.is_supported() {
        return Err(BracketError::UnsupportedTournamentType(tournament_type));
    }

    let participant_count = seeds.iter().filter(|s| !s.is_bye()).count();
    if participant_count < 2 {
        return Err(BracketError::InvalidParticipantCount(participant_count));
    }

    seeds.sort_by_key(|s| s.seed_position);
    for (expected, seed) in (1u32..).zip(&seeds) {
        if seed.seed_position != expected {
            return Err(BracketError::InvalidData(format!(
                "seed positions must be dense from 1, found {} at index {}",
                seed.seed_position,
                expected - 1
            )));
        }
    }

    let bracket_size = bracket_size_for(seeds.len());
    for position in (seeds.len() as u32 + 1)..=bracket_size {
        seeds.push(Seed {
            tournament_id,
            seed_position: position,
            player_id: None,
            elo_rating: None,
        });
    }
    let rounds = bracket_size.trailing_zeros();

    let mut matches = Vec::with_capacity(bracket_size as usize);
    for ((high, low), match_number) in round_one_pairs(&seeds).into_iter().zip(1..) {
        let mut m = Match::shell(tournament_id, 1, match_number);
        m.player1_id = high.player_id;
        m.player2_id = low.player_id;
        matches.push(m);
    }
    for round in 2..=rounds {
        for match_number in 1..=(bracket_size >> round) {
            matches.push(Match::shell(tournament_id, round, match_number));
        }
    }
    let has_third_place_match = has_third_place_match && rounds >= 2;
    if has_third_place_match {
        let mut third_place = Match::shell(tournament_id, rounds, 2);
        third_place.is_third_place_match = true;
        matches.push(third_place);
    }

    let now = Utc::now();
    let meta = BracketMeta {
        tournament_id,
        tournament_type,
        bracket_size,
        participant_count: participant_count as u32,
        rounds,
        seeding_method,
        has_third_place_match,
        generated_at: now,
    };
    let mut bracket = Bracket::new(meta, matches);

    let mut changes = Vec::new();
    let mut byes = 0;
    for idx in 0..bracket.matches.len() {
        let m = &bracket.matches[idx];
        if m.round_number != 1 || m.is_third_place_match {
            continue;
        }
        let advancing = match (m.player1_id, m.player2_id) {
            (Some(player_id), None) | (None, Some(player_id)) => player_id,
            _ => continue,
        };
        let bye = MatchChange::Completed {
            match_id: m.id,
            winner_id: advancing,
            score_player1: None,
            score_player2: None,
            completed_at: now,
        };
        bye.apply_to(&mut bracket.matches[idx]);
        if rounds > 1 {
            propagate_winner(&mut bracket, idx, &mut changes)?;
        }
        byes += 1;
    }

    log::info!(
        "Generated {}-slot bracket for tournament {}: {} participant(s), {} round(s), {} bye(s)",
        bracket_size,
        tournament_id,
        participant_count,
        rounds,
        byes
    );

    Ok(GeneratedBracket {
        meta: bracket.meta,
        seeds,
        matches: bracket.matches,
    })
}
