//! Final standings and reward calculation for a completed bracket.

use std::collections::HashMap;

use super::bracket::Bracket;
use super::errors::{BracketError, BracketResult};
use super::models::{
    Participant, PlayerId, PlayerResult, RewardLogEntry, RewardSource, Seed,
};
use super::rewards::{RankTier, RewardPolicy};

/// Final position of every real player in a completed bracket
///
/// Champion 1, runner-up 2. With a third-place match its winner is 3 and its
/// loser 4; without one both semifinal losers share 3. Everyone else is
/// ordered by the round they were eliminated in (later is better), then by
/// seed, and numbered sequentially from the next free position.
///
/// # Errors
///
/// * `BracketError::TournamentNotComplete` - final or third-place match still open
pub fn final_positions(bracket: &Bracket, seeds: &[Seed]) -> BracketResult<Vec<(PlayerId, u32)>> {
    if !bracket.is_complete() {
        return Err(BracketError::TournamentNotComplete(bracket.tournament_id()));
    }
    let Some(final_match) = bracket.final_match() else {
        return Err(BracketError::TournamentNotComplete(bracket.tournament_id()));
    };

    let participant_count = seeds.iter().filter(|s| !s.is_bye()).count() as u32;
    let mut positions: HashMap<PlayerId, u32> = HashMap::with_capacity(seeds.len());

    if let Some(champion) = final_match.winner_id {
        positions.insert(champion, 1);
    }
    if let Some(runner_up) = final_match.loser_id() {
        positions.insert(runner_up, 2);
    }

    let mut next_free = 3;
    match bracket.third_place_match() {
        Some(third_place) => {
            if let Some(winner) = third_place.winner_id {
                positions.insert(winner, 3);
                next_free = 4;
            }
            if let Some(loser) = third_place.loser_id() {
                positions.insert(loser, 4);
                next_free = 5;
            }
        }
        None => {
            let losers: Vec<PlayerId> = bracket
                .semifinals()
                .iter()
                .filter_map(|m| m.loser_id())
                .collect();
            for loser in &losers {
                positions.insert(*loser, 3);
            }
            next_free += losers.len() as u32;
        }
    }

    let mut remaining: Vec<(u32, u32, PlayerId)> = seeds
        .iter()
        .filter_map(|s| s.player_id.map(|p| (s, p)))
        .filter(|(_, p)| !positions.contains_key(p))
        .map(|(s, p)| (elimination_round(bracket, p), s.seed_position, p))
        .collect();
    remaining.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    for (_, _, player_id) in remaining {
        positions.insert(player_id, next_free.min(participant_count));
        next_free += 1;
    }

    let mut ordered: Vec<(PlayerId, u32)> = positions.into_iter().collect();
    ordered.sort_by_key(|&(player_id, position)| (position, seed_of(seeds, player_id)));
    Ok(ordered)
}

/// Compute standings and rewards for a completed bracket
///
/// Rewards already booked in `recorded` win over the table, so a player is
/// never awarded twice with different figures.
///
/// # Errors
///
/// * `BracketError::TournamentNotComplete` - final or third-place match still open
pub fn compute_standings(
    bracket: &Bracket,
    seeds: &[Seed],
    participants: &[Participant],
    policy: &RewardPolicy,
    recorded: &HashMap<PlayerId, RewardLogEntry>,
) -> BracketResult<Vec<PlayerResult>> {
    let positions = final_positions(bracket, seeds)?;
    let by_player: HashMap<PlayerId, &Participant> =
        participants.iter().map(|p| (p.player_id, p)).collect();
    let tournament_id = bracket.tournament_id();

    let mut recorded_count = 0;
    let results: Vec<PlayerResult> = positions
        .into_iter()
        .map(|(player_id, final_position)| {
            let participant = by_player.get(&player_id);
            let current_elo = participant.map(|p| p.elo_rating).unwrap_or_else(|| {
                seeds
                    .iter()
                    .find(|s| s.player_id == Some(player_id))
                    .and_then(|s| s.elo_rating)
                    .unwrap_or_default()
            });
            let tier = participant.map(|p| p.rank_tier).unwrap_or(RankTier::K);

            // A booked entry is already part of the current rating
            let (elo_before, elo_change, spa_points_earned, reward_source) =
                match recorded.get(&player_id) {
                    Some(entry) => {
                        recorded_count += 1;
                        (
                            current_elo - entry.elo_change,
                            entry.elo_change,
                            entry.spa_points,
                            RewardSource::Recorded,
                        )
                    }
                    None => (
                        current_elo,
                        policy.elo_delta(final_position),
                        policy.spa_points(final_position, tier),
                        RewardSource::Computed,
                    ),
                };

            let (wins, losses) = record_of(bracket, player_id);
            PlayerResult {
                tournament_id,
                player_id,
                final_position,
                reward_bucket: policy.bucket_for(final_position),
                elo_before,
                elo_after: elo_before + elo_change,
                elo_change,
                spa_points_earned,
                wins,
                losses,
                matches_played: wins + losses,
                reward_source,
            }
        })
        .collect();

    log::info!(
        "Standings for tournament {}: {} player(s), {} from recorded rewards, {} computed",
        tournament_id,
        results.len(),
        recorded_count,
        results.len() - recorded_count
    );

    Ok(results)
}

/// Round of the played match a player lost, 0 if none
fn elimination_round(bracket: &Bracket, player_id: PlayerId) -> u32 {
    bracket
        .matches
        .iter()
        .filter(|m| !m.is_third_place_match && m.is_completed() && !m.is_bye())
        .filter(|m| m.loser_id() == Some(player_id))
        .map(|m| m.round_number)
        .max()
        .unwrap_or(0)
}

/// Wins and losses over played matches; byes and walkovers do not count
fn record_of(bracket: &Bracket, player_id: PlayerId) -> (u32, u32) {
    bracket
        .matches
        .iter()
        .filter(|m| m.is_completed() && !m.is_bye() && m.involves(player_id))
        .fold((0, 0), |(wins, losses), m| {
            if m.winner_id == Some(player_id) {
                (wins + 1, losses)
            } else {
                (wins, losses + 1)
            }
        })
}

fn seed_of(seeds: &[Seed], player_id: PlayerId) -> u32 {
    seeds
        .iter()
        .find(|s| s.player_id == Some(player_id))
        .map(|s| s.seed_position)
        .unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournament::advancement::report_result;
    use crate::tournament::builder::generate_bracket;
    use crate::tournament::models::{SeedingMethod, TournamentType};
    use crate::tournament::rewards::RewardBucket;
    use chrono::Utc;

    fn seeds(count: u32) -> Vec<Seed> {
        let size = count.max(2).next_power_of_two();
        (1..=size)
            .map(|position| Seed {
                tournament_id: 3,
                seed_position: position,
                player_id: (position <= count).then_some(i64::from(position)),
                elo_rating: (position <= count).then_some(2000 - position as i32 * 10),
            })
            .collect()
    }

    fn participants(count: u32, tier: RankTier) -> Vec<Participant> {
        (1..=count)
            .map(|i| Participant {
                player_id: i64::from(i),
                display_name: format!("P{i}"),
                elo_rating: 2000 - i as i32 * 10,
                rank_tier: tier,
                registered_at: Utc::now(),
            })
            .collect()
    }

    /// Play every match in order, lower seed (player id) always winning
    fn play_out(count: u32, third_place: bool) -> (Bracket, Vec<Seed>) {
        let generated = generate_bracket(
            3,
            TournamentType::SingleElimination,
            seeds(count),
            SeedingMethod::EloRanking,
            third_place,
        )
        .unwrap();
        let mut bracket = Bracket::new(generated.meta, generated.matches);
        while !bracket.is_complete() {
            let next = bracket
                .matches
                .iter()
                .find(|m| m.is_ready())
                .cloned()
                .expect("a playable match");
            let winner = next.player1_id.unwrap().min(next.player2_id.unwrap());
            report_result(&mut bracket, next.id, winner, 3, 1, Utc::now()).unwrap();
        }
        (bracket, generated.seeds)
    }

    fn position_of(positions: &[(PlayerId, u32)], player: PlayerId) -> u32 {
        positions.iter().find(|(p, _)| *p == player).unwrap().1
    }

    #[test]
    fn test_incomplete_bracket_rejected() {
        let generated = generate_bracket(
            3,
            TournamentType::SingleElimination,
            seeds(4),
            SeedingMethod::EloRanking,
            false,
        )
        .unwrap();
        let bracket = Bracket::new(generated.meta, generated.matches);
        let err = final_positions(&bracket, &generated.seeds).unwrap_err();
        assert!(matches!(err, BracketError::TournamentNotComplete(3)));
    }

    #[test]
    fn test_eight_players_with_third_place() {
        let (bracket, seeds) = play_out(8, true);
        let positions = final_positions(&bracket, &seeds).unwrap();
        assert_eq!(positions.len(), 8);
        assert_eq!(position_of(&positions, 1), 1);
        assert_eq!(position_of(&positions, 2), 2);
        assert_eq!(position_of(&positions, 3), 3);
        assert_eq!(position_of(&positions, 4), 4);
        // Quarterfinal losers numbered by seed
        assert_eq!(position_of(&positions, 5), 5);
        assert_eq!(position_of(&positions, 8), 8);
    }

    #[test]
    fn test_semifinal_losers_tie_without_third_place() {
        let (bracket, seeds) = play_out(8, false);
        let positions = final_positions(&bracket, &seeds).unwrap();
        assert_eq!(position_of(&positions, 3), 3);
        assert_eq!(position_of(&positions, 4), 3);
        assert_eq!(position_of(&positions, 5), 5);
        assert_eq!(position_of(&positions, 8), 8);
    }

    #[test]
    fn test_positions_capped_at_participant_count() {
        let (bracket, seeds) = play_out(5, false);
        let positions = final_positions(&bracket, &seeds).unwrap();
        assert_eq!(positions.len(), 5);
        assert!(positions.iter().all(|(_, p)| *p <= 5));
        // Seed 5 lost in round one, the earliest elimination
        assert_eq!(position_of(&positions, 5), 5);
    }

    #[test]
    fn test_three_players_walkover_third() {
        let (bracket, seeds) = play_out(3, true);
        let positions = final_positions(&bracket, &seeds).unwrap();
        assert_eq!(positions, vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn test_rewards_use_tier_multiplier() {
        let (bracket, seeds) = play_out(4, true);
        let policy = RewardPolicy::default();
        let results = compute_standings(
            &bracket,
            &seeds,
            &participants(4, RankTier::EPlus),
            &policy,
            &HashMap::new(),
        )
        .unwrap();

        let champion = &results[0];
        assert_eq!(champion.player_id, 1);
        assert_eq!(champion.reward_bucket, RewardBucket::First);
        assert_eq!(champion.elo_change, 100);
        assert_eq!(champion.elo_after, champion.elo_before + 100);
        // 1000 base at 210%
        assert_eq!(champion.spa_points_earned, 2100);
        assert_eq!(champion.wins, 2);
        assert_eq!(champion.losses, 0);
        assert_eq!(champion.reward_source, RewardSource::Computed);

        let fourth = results.iter().find(|r| r.final_position == 4).unwrap();
        assert_eq!(fourth.wins, 0);
        assert_eq!(fourth.losses, 2);
        assert_eq!(fourth.matches_played, 2);
    }

    #[test]
    fn test_recorded_rewards_take_precedence() {
        let (bracket, seeds) = play_out(4, false);
        let mut recorded = HashMap::new();
        recorded.insert(
            2,
            RewardLogEntry {
                tournament_id: 3,
                player_id: 2,
                elo_change: 42,
                spa_points: 777,
                idempotency_key: RewardLogEntry::key_for(3, 2),
                created_at: Utc::now(),
            },
        );

        let results = compute_standings(
            &bracket,
            &seeds,
            &participants(4, RankTier::K),
            &RewardPolicy::default(),
            &recorded,
        )
        .unwrap();

        let runner_up = results.iter().find(|r| r.player_id == 2).unwrap();
        assert_eq!(runner_up.elo_change, 42);
        // Participant rating 1980 already includes the booked +42
        assert_eq!(runner_up.elo_after, 1980);
        assert_eq!(runner_up.elo_before, 1938);
        assert_eq!(runner_up.spa_points_earned, 777);
        assert_eq!(runner_up.reward_source, RewardSource::Recorded);

        let others = results.iter().filter(|r| r.player_id != 2);
        assert!(others.into_iter().all(|r| r.reward_source == RewardSource::Computed));
    }

    #[test]
    fn test_byes_do_not_count_as_wins() {
        let (bracket, seeds) = play_out(5, false);
        let results = compute_standings(
            &bracket,
            &seeds,
            &participants(5, RankTier::K),
            &RewardPolicy::default(),
            &HashMap::new(),
        )
        .unwrap();
        // Seed 1 had a bye, then won the semifinal and final
        let champion = results.iter().find(|r| r.player_id == 1).unwrap();
        assert_eq!(champion.wins, 2);
        assert_eq!(champion.matches_played, 2);
    }
}
