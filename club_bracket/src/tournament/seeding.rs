//! Seed assignment and bracket placement.

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use std::collections::HashSet;

use super::errors::{BracketError, BracketResult};
use super::models::{Participant, Seed, SeedingMethod, TournamentId};

/// Smallest power of two that holds `count` slots (minimum 2)
pub fn bracket_size_for(count: usize) -> u32 {
    (count.max(2) as u32).next_power_of_two()
}

/// Order participants and assign dense seed positions, padding with byes
///
/// Real players take seeds `1..=n`; byes take the remaining positions up to
/// the bracket size, so the top seeds are the ones that receive byes.
///
/// `rng_seed` makes the `Random` method reproducible; it is ignored otherwise.
///
/// # Errors
///
/// * `BracketError::InvalidParticipantCount` - fewer than two participants
/// * `BracketError::DuplicateParticipant` - a player appears twice
pub fn assign_seeds(
    tournament_id: TournamentId,
    participants: &[Participant],
    method: SeedingMethod,
    rng_seed: Option<u64>,
) -> BracketResult<Vec<Seed>> {
    if participants.len() < 2 {
        return Err(BracketError::InvalidParticipantCount(participants.len()));
    }

    let mut seen = HashSet::with_capacity(participants.len());
    for p in participants {
        if !seen.insert(p.player_id) {
            return Err(BracketError::DuplicateParticipant(p.player_id));
        }
    }

    let mut ordered: Vec<&Participant> = participants.iter().collect();
    match method {
        SeedingMethod::EloRanking => ordered.sort_by(|a, b| {
            b.elo_rating
                .cmp(&a.elo_rating)
                .then(a.registered_at.cmp(&b.registered_at))
                .then(a.player_id.cmp(&b.player_id))
        }),
        SeedingMethod::RegistrationOrder => ordered.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then(a.player_id.cmp(&b.player_id))
        }),
        SeedingMethod::Random => {
            // Start from a canonical order so the same seed always gives the same draw
            ordered.sort_by_key(|p| p.player_id);
            let mut rng = match rng_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            ordered.shuffle(&mut rng);
        }
    }

    let size = bracket_size_for(ordered.len());
    let mut seeds: Vec<Seed> = ordered
        .iter()
        .zip(1..)
        .map(|(p, position)| Seed {
            tournament_id,
            seed_position: position,
            player_id: Some(p.player_id),
            elo_rating: Some(p.elo_rating),
        })
        .collect();

    for position in (ordered.len() as u32 + 1)..=size {
        seeds.push(Seed {
            tournament_id,
            seed_position: position,
            player_id: None,
            elo_rating: None,
        });
    }

    log::debug!(
        "Seeded {} participant(s) into a {}-slot bracket for tournament {} using {}",
        ordered.len(),
        size,
        tournament_id,
        method
    );

    Ok(seeds)
}

/// Standard bracket placement for a power-of-two bracket
///
/// Returns seed positions in slot order: round-one match `m` pairs the entries
/// at indices `2m-2` and `2m-1`. Built recursively so seed `s` always faces
/// seed `size + 1 - s` in round one, and seeds 1 and 2 sit in opposite halves.
pub fn bracket_order(size: u32) -> Vec<u32> {
    let mut order = vec![1u32];
    let mut width = 1u32;
    while width < size {
        width *= 2;
        order = order
            .into_iter()
            .flat_map(|seed| [seed, width + 1 - seed])
            .collect();
    }
    order
}

/// Seeds paired for round one, in match-number order
///
/// `seeds` must hold a dense, power-of-two set of positions as produced by
/// [`assign_seeds`].
pub fn round_one_pairs(seeds: &[Seed]) -> Vec<(&Seed, &Seed)> {
    let mut by_position: Vec<&Seed> = seeds.iter().collect();
    by_position.sort_by_key(|s| s.seed_position);
    bracket_order(seeds.len() as u32)
        .chunks(2)
        .map(|pair| {
            (
                by_position[(pair[0] - 1) as usize],
                by_position[(pair[1] - 1) as usize],
            )
        })
        .collect()
}
