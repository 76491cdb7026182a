//! Reward table: ELO deltas and SPA points by finishing position and rank tier.
//!
//! ELO change depends only on the position bucket. SPA is the bucket's base
//! value scaled by a per-tier percentage, using integer arithmetic so awards
//! are reproducible exactly.

use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};

use super::errors::{BracketError, BracketResult};

/// Player rank tier, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RankTier {
    #[serde(rename = "K")]
    K,
    #[serde(rename = "K+")]
    KPlus,
    #[serde(rename = "I")]
    I,
    #[serde(rename = "I+")]
    IPlus,
    #[serde(rename = "H")]
    H,
    #[serde(rename = "H+")]
    HPlus,
    #[serde(rename = "G")]
    G,
    #[serde(rename = "G+")]
    GPlus,
    #[serde(rename = "F")]
    F,
    #[serde(rename = "F+")]
    FPlus,
    #[serde(rename = "E")]
    E,
    #[serde(rename = "E+")]
    EPlus,
}

impl RankTier {
    pub const ALL: [RankTier; 12] = [
        RankTier::K,
        RankTier::KPlus,
        RankTier::I,
        RankTier::IPlus,
        RankTier::H,
        RankTier::HPlus,
        RankTier::G,
        RankTier::GPlus,
        RankTier::F,
        RankTier::FPlus,
        RankTier::E,
        RankTier::EPlus,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RankTier::K => "K",
            RankTier::KPlus => "K+",
            RankTier::I => "I",
            RankTier::IPlus => "I+",
            RankTier::H => "H",
            RankTier::HPlus => "H+",
            RankTier::G => "G",
            RankTier::GPlus => "G+",
            RankTier::F => "F",
            RankTier::FPlus => "F+",
            RankTier::E => "E",
            RankTier::EPlus => "E+",
        }
    }
}

impl fmt::Display for RankTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankTier {
    type Err = BracketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RankTier::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BracketError::InvalidData(format!("unknown rank tier '{s}'")))
    }
}

/// Finishing-position bucket used for reward lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardBucket {
    First,
    Second,
    Third,
    Fourth,
    #[serde(rename = "TOP_8")]
    Top8,
    #[serde(rename = "TOP_16")]
    Top16,
    Participation,
}

impl fmt::Display for RewardBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardBucket::First => write!(f, "FIRST"),
            RewardBucket::Second => write!(f, "SECOND"),
            RewardBucket::Third => write!(f, "THIRD"),
            RewardBucket::Fourth => write!(f, "FOURTH"),
            RewardBucket::Top8 => write!(f, "TOP_8"),
            RewardBucket::Top16 => write!(f, "TOP_16"),
            RewardBucket::Participation => write!(f, "PARTICIPATION"),
        }
    }
}

impl FromStr for RewardBucket {
    type Err = BracketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FIRST" => Ok(RewardBucket::First),
            "SECOND" => Ok(RewardBucket::Second),
            "THIRD" => Ok(RewardBucket::Third),
            "FOURTH" => Ok(RewardBucket::Fourth),
            "TOP_8" => Ok(RewardBucket::Top8),
            "TOP_16" => Ok(RewardBucket::Top16),
            "PARTICIPATION" => Ok(RewardBucket::Participation),
            other => Err(BracketError::InvalidData(format!(
                "unknown reward bucket '{other}'"
            ))),
        }
    }
}

/// Reward row for one bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPosition {
    pub bucket: RewardBucket,
    pub elo_delta: i32,
    pub base_spa: i64,
}

/// SPA scaling for one rank tier, in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierMultiplier {
    pub tier: RankTier,
    pub percent: u32,
}

/// Complete reward policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPolicy {
    pub positions: Vec<RewardPosition>,
    pub tier_multipliers: Vec<TierMultiplier>,
    /// Last position that still counts as TOP_8
    #[serde(default = "default_top8_cutoff")]
    pub top8_cutoff: u32,
    /// Last position that still counts as TOP_16
    #[serde(default = "default_top16_cutoff")]
    pub top16_cutoff: u32,
}

fn default_top8_cutoff() -> u32 {
    8
}

fn default_top16_cutoff() -> u32 {
    16
}

impl Default for RewardPolicy {
    fn default() -> Self {
        let positions = vec![
            RewardPosition { bucket: RewardBucket::First, elo_delta: 100, base_spa: 1000 },
            RewardPosition { bucket: RewardBucket::Second, elo_delta: 75, base_spa: 700 },
            RewardPosition { bucket: RewardBucket::Third, elo_delta: 50, base_spa: 500 },
            RewardPosition { bucket: RewardBucket::Fourth, elo_delta: 40, base_spa: 400 },
            RewardPosition { bucket: RewardBucket::Top8, elo_delta: 25, base_spa: 250 },
            RewardPosition { bucket: RewardBucket::Top16, elo_delta: 15, base_spa: 150 },
            RewardPosition { bucket: RewardBucket::Participation, elo_delta: 10, base_spa: 100 },
        ];

        // 100% at K, +10 points per tier up to 210% at E+
        let tier_multipliers = RankTier::ALL
            .into_iter()
            .zip((100..).step_by(10))
            .map(|(tier, percent)| TierMultiplier { tier, percent })
            .collect();

        Self {
            positions,
            tier_multipliers,
            top8_cutoff: default_top8_cutoff(),
            top16_cutoff: default_top16_cutoff(),
        }
    }
}

impl RewardPolicy {
    /// Load the policy from the environment
    ///
    /// - `REWARD_TABLE_PATH`: JSON file with a full policy (default: built-in table)
    /// - `BRACKET_CUTOFF_TOP8` / `BRACKET_CUTOFF_TOP16`: override the bucket cutoffs
    ///
    /// # Errors
    ///
    /// Returns `BracketError::InvalidRewardPolicy` if the file can't be read or the
    /// resulting policy fails validation.
    pub fn from_env() -> BracketResult<Self> {
        let mut policy = match std::env::var("REWARD_TABLE_PATH") {
            Ok(path) if !path.trim().is_empty() => Self::from_json_file(path.trim())?,
            _ => Self::default(),
        };

        if let Some(cutoff) = parse_env("BRACKET_CUTOFF_TOP8")? {
            policy.top8_cutoff = cutoff;
        }
        if let Some(cutoff) = parse_env("BRACKET_CUTOFF_TOP16")? {
            policy.top16_cutoff = cutoff;
        }

        policy.validate()?;
        Ok(policy)
    }

    /// Load and validate a policy from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> BracketResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BracketError::InvalidRewardPolicy(format!("cannot read {}: {e}", path.display()))
        })?;
        let policy: RewardPolicy = serde_json::from_str(&raw)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Check the policy is complete and fair
    ///
    /// Every bucket and tier must be present exactly once, tier multipliers must
    /// not decrease with rank, and cutoffs must satisfy `4 < top8 <= top16`.
    pub fn validate(&self) -> BracketResult<()> {
        for bucket in [
            RewardBucket::First,
            RewardBucket::Second,
            RewardBucket::Third,
            RewardBucket::Fourth,
            RewardBucket::Top8,
            RewardBucket::Top16,
            RewardBucket::Participation,
        ] {
            let count = self.positions.iter().filter(|p| p.bucket == bucket).count();
            if count != 1 {
                return Err(BracketError::InvalidRewardPolicy(format!(
                    "bucket {bucket} defined {count} times"
                )));
            }
        }

        if let Some(p) = self.positions.iter().find(|p| p.base_spa < 0) {
            return Err(BracketError::InvalidRewardPolicy(format!(
                "bucket {} has negative SPA",
                p.bucket
            )));
        }

        let mut previous = 0;
        for tier in RankTier::ALL {
            let percent = self.tier_percent_checked(tier)?;
            if percent < previous {
                return Err(BracketError::InvalidRewardPolicy(format!(
                    "multiplier for {tier} ({percent}%) is below the tier beneath it ({previous}%)"
                )));
            }
            previous = percent;
        }

        if self.top8_cutoff <= 4 || self.top16_cutoff < self.top8_cutoff {
            return Err(BracketError::InvalidRewardPolicy(format!(
                "cutoffs must satisfy 4 < top8 <= top16, got top8={} top16={}",
                self.top8_cutoff, self.top16_cutoff
            )));
        }

        Ok(())
    }

    /// Bucket for a 1-based finishing position; 0 is not a placing
    pub fn bucket_for(&self, position: u32) -> RewardBucket {
        match position {
            0 => RewardBucket::Participation,
            1 => RewardBucket::First,
            2 => RewardBucket::Second,
            3 => RewardBucket::Third,
            4 => RewardBucket::Fourth,
            p if p <= self.top8_cutoff => RewardBucket::Top8,
            p if p <= self.top16_cutoff => RewardBucket::Top16,
            _ => RewardBucket::Participation,
        }
    }

    /// ELO change for a finishing position
    pub fn elo_delta(&self, position: u32) -> i32 {
        self.position_reward(self.bucket_for(position))
            .map(|p| p.elo_delta)
            .unwrap_or(0)
    }

    /// SPA awarded for a finishing position at a rank tier
    pub fn spa_points(&self, position: u32, tier: RankTier) -> i64 {
        let base = self
            .position_reward(self.bucket_for(position))
            .map(|p| p.base_spa)
            .unwrap_or(0);
        let percent = i64::from(self.tier_percent(tier));
        base * percent / 100
    }

    pub fn position_reward(&self, bucket: RewardBucket) -> Option<&RewardPosition> {
        self.positions.iter().find(|p| p.bucket == bucket)
    }

    /// Multiplier for a tier, 100% if the tier is missing
    pub fn tier_percent(&self, tier: RankTier) -> u32 {
        self.tier_percent_checked(tier).unwrap_or(100)
    }

    fn tier_percent_checked(&self, tier: RankTier) -> BracketResult<u32> {
        let mut found = self.tier_multipliers.iter().filter(|m| m.tier == tier);
        match (found.next(), found.next()) {
            (Some(m), None) => Ok(m.percent),
            (None, _) => Err(BracketError::InvalidRewardPolicy(format!(
                "no multiplier for tier {tier}"
            ))),
            (Some(_), Some(_)) => Err(BracketError::InvalidRewardPolicy(format!(
                "tier {tier} defined more than once"
            ))),
        }
    }
}

fn parse_env(key: &str) -> BracketResult<Option<u32>> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| BracketError::InvalidRewardPolicy(format!("{key} must be a number"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_policy_is_valid() {
        RewardPolicy::default().validate().unwrap();
    }

    #[test]
    fn test_bucket_cutoffs() {
        let policy = RewardPolicy::default();
        assert_eq!(policy.bucket_for(1), RewardBucket::First);
        assert_eq!(policy.bucket_for(2), RewardBucket::Second);
        assert_eq!(policy.bucket_for(3), RewardBucket::Third);
        assert_eq!(policy.bucket_for(4), RewardBucket::Fourth);
        for p in 5..=8 {
            assert_eq!(policy.bucket_for(p), RewardBucket::Top8);
        }
        for p in 9..=16 {
            assert_eq!(policy.bucket_for(p), RewardBucket::Top16);
        }
        assert_eq!(policy.bucket_for(17), RewardBucket::Participation);
        assert_eq!(policy.bucket_for(64), RewardBucket::Participation);
        assert_eq!(policy.bucket_for(0), RewardBucket::Participation);
    }

    #[test]
    fn test_elo_is_rank_independent() {
        let policy = RewardPolicy::default();
        assert_eq!(policy.elo_delta(1), 100);
        assert_eq!(policy.elo_delta(6), 25);
        assert_eq!(policy.elo_delta(40), 10);
    }

    #[test]
    fn test_spa_scales_with_tier() {
        let policy = RewardPolicy::default();
        assert_eq!(policy.spa_points(1, RankTier::K), 1000);
        assert_eq!(policy.spa_points(1, RankTier::EPlus), 2100);
        assert_eq!(policy.spa_points(5, RankTier::H), 350);

        let mut previous = 0;
        for tier in RankTier::ALL {
            let spa = policy.spa_points(3, tier);
            assert!(spa >= previous, "SPA must not drop at tier {tier}");
            previous = spa;
        }
    }

    #[test]
    fn test_spa_uses_floor_division() {
        let mut policy = RewardPolicy::default();
        for p in &mut policy.positions {
            if p.bucket == RewardBucket::Participation {
                p.base_spa = 15;
            }
        }
        // 15 * 110 / 100 = 16.5
        assert_eq!(policy.spa_points(99, RankTier::KPlus), 16);
    }

    #[test]
    fn test_validate_rejects_decreasing_multipliers() {
        let mut policy = RewardPolicy::default();
        policy.tier_multipliers[5].percent = 50;
        let err = policy.validate().unwrap_err();
        assert!(matches!(err, BracketError::InvalidRewardPolicy(_)));
    }

    #[test]
    fn test_validate_rejects_missing_bucket() {
        let mut policy = RewardPolicy::default();
        policy.positions.retain(|p| p.bucket != RewardBucket::Top16);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_cutoffs() {
        let policy = RewardPolicy {
            top8_cutoff: 10,
            top16_cutoff: 9,
            ..RewardPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_rank_tier_parsing() {
        assert_eq!("K+".parse::<RankTier>().unwrap(), RankTier::KPlus);
        assert_eq!("e+".parse::<RankTier>().unwrap(), RankTier::EPlus);
        assert!("Z".parse::<RankTier>().is_err());
        assert!(RankTier::K < RankTier::EPlus);
    }

    #[test]
    fn test_policy_json_round_trip() {
        let policy = RewardPolicy::default();
        let json = serde_json::to_string(&policy).unwrap();
        assert!(json.contains("\"TOP_8\""));
        assert!(json.contains("\"K+\""));
        let parsed: RewardPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, policy);
    }

    #[test]
    #[serial]
    fn test_from_env_cutoff_override() {
        // SAFETY: serialized with the other env tests
        unsafe {
            std::env::remove_var("REWARD_TABLE_PATH");
            std::env::set_var("BRACKET_CUTOFF_TOP8", "6");
            std::env::set_var("BRACKET_CUTOFF_TOP16", "12");
        }

        let policy = RewardPolicy::from_env().unwrap();
        assert_eq!(policy.bucket_for(6), RewardBucket::Top8);
        assert_eq!(policy.bucket_for(7), RewardBucket::Top16);
        assert_eq!(policy.bucket_for(13), RewardBucket::Participation);

        unsafe {
            std::env::remove_var("BRACKET_CUTOFF_TOP8");
            std::env::remove_var("BRACKET_CUTOFF_TOP16");
        }
    }

    #[test]
    #[serial]
    fn test_from_env_reads_json_file() {
        let mut policy = RewardPolicy::default();
        policy.positions[0].elo_delta = 120;
        let path = std::env::temp_dir().join(format!("reward_policy_{}.json", std::process::id()));
        std::fs::write(&path, serde_json::to_string(&policy).unwrap()).unwrap();

        unsafe {
            std::env::set_var("REWARD_TABLE_PATH", &path);
        }
        let loaded = RewardPolicy::from_env().unwrap();
        assert_eq!(loaded.elo_delta(1), 120);

        unsafe {
            std::env::remove_var("REWARD_TABLE_PATH");
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage_cutoff() {
        unsafe {
            std::env::set_var("BRACKET_CUTOFF_TOP8", "eight");
        }
        assert!(RewardPolicy::from_env().is_err());
        unsafe {
            std::env::remove_var("BRACKET_CUTOFF_TOP8");
        }
    }
}
