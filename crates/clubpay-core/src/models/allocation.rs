//! Allocation inputs
//!
//! Callers describe exceptions as id lists (`FlagLists`). Before allocation
//! those lists are folded once into a per-member `MemberFlags` record.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::settlement::{CostTotals, MeetingId, MemberId};

/// Team-match bonus/penalty configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TeamMatch {
    #[serde(default)]
    pub winner_team_member_ids: Vec<MemberId>,
    #[serde(default)]
    pub loser_team_member_ids: Vec<MemberId>,
    #[serde(default)]
    pub winner_team_amount: i64,
    #[serde(default)]
    pub loser_team_amount: i64,
}

/// Cost configuration for the per-member strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PerMemberCostConfig {
    /// Price of one game
    #[serde(default)]
    pub game_fee_per_game: i64,
    /// Flat add-on for every attendee
    #[serde(default)]
    pub other_per_person: i64,
    /// Flat add-on unless the member skipped food
    #[serde(default)]
    pub food_per_person: i64,
    /// Flat add-on for flagged members
    #[serde(default)]
    pub penalty_amount: i64,
    /// Present only for team matches
    #[serde(default)]
    pub team_match: Option<TeamMatch>,
}

/// How a settlement's amounts are derived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Game counts, discounts, penalties and team amounts per member
    PerMember(PerMemberCostConfig),
    /// Aggregate totals divided by headcount
    EqualSplit,
}

impl AllocationStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            AllocationStrategy::PerMember(_) => "per_member",
            AllocationStrategy::EqualSplit => "equal_split",
        }
    }
}

/// Exception flags in the list form callers provide them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlagLists {
    #[serde(default)]
    pub exclude_food_member_ids: Vec<MemberId>,
    #[serde(default)]
    pub exclude_game_member_ids: Vec<MemberId>,
    #[serde(default)]
    pub has_penalty_member_ids: Vec<MemberId>,
    #[serde(default)]
    pub is_discounted_member_ids: Vec<MemberId>,
    #[serde(default)]
    pub member_game_counts: HashMap<MemberId, i64>,
}

/// Which side of a team match a member played on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamSide {
    Winner,
    Loser,
}

/// Resolved exceptions for one member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemberFlags {
    pub exclude_food: bool,
    pub exclude_game: bool,
    pub has_penalty: bool,
    pub is_discounted: bool,
    pub game_count: i64,
    pub team: Option<TeamSide>,
}

/// Per-member flag records keyed by member id
#[derive(Debug, Clone, Default)]
pub struct MemberFlagSet {
    flags: HashMap<MemberId, MemberFlags>,
}

impl MemberFlagSet {
    /// Fold list-form flags (and team rosters, when given) into records.
    /// A member on both team rosters is treated as a winner.
    pub fn from_lists(lists: &FlagLists, team_match: Option<&TeamMatch>) -> Self {
        let mut flags: HashMap<MemberId, MemberFlags> = HashMap::new();

        for id in &lists.exclude_food_member_ids {
            flags.entry(*id).or_default().exclude_food = true;
        }
        for id in &lists.exclude_game_member_ids {
            flags.entry(*id).or_default().exclude_game = true;
        }
        for id in &lists.has_penalty_member_ids {
            flags.entry(*id).or_default().has_penalty = true;
        }
        for id in &lists.is_discounted_member_ids {
            flags.entry(*id).or_default().is_discounted = true;
        }
        for (id, count) in &lists.member_game_counts {
            flags.entry(*id).or_default().game_count = *count;
        }

        if let Some(team) = team_match {
            for id in &team.loser_team_member_ids {
                flags.entry(*id).or_default().team = Some(TeamSide::Loser);
            }
            for id in &team.winner_team_member_ids {
                flags.entry(*id).or_default().team = Some(TeamSide::Winner);
            }
        }

        Self { flags }
    }

    /// Flags for a member; absent members get all-default flags
    pub fn get(&self, member_id: MemberId) -> MemberFlags {
        self.flags.get(&member_id).copied().unwrap_or_default()
    }

    /// Number of the given members that skipped food
    pub fn excluded_food_count(&self, member_ids: &[MemberId]) -> usize {
        member_ids
            .iter()
            .filter(|id| self.get(**id).exclude_food)
            .count()
    }
}

/// Everything needed to create a settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub meeting_id: MeetingId,
    pub member_ids: Vec<MemberId>,
    pub totals: CostTotals,
    #[serde(default)]
    pub memo: String,
    pub strategy: AllocationStrategy,
    #[serde(default)]
    pub flags: FlagLists,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_default_when_absent() {
        let set = MemberFlagSet::from_lists(&FlagLists::default(), None);
        assert_eq!(set.get(42), MemberFlags::default());
        assert_eq!(set.get(42).game_count, 0);
    }

    #[test]
    fn test_flags_folded_per_member() {
        let lists = FlagLists {
            exclude_food_member_ids: vec![1, 3],
            exclude_game_member_ids: vec![2],
            has_penalty_member_ids: vec![1],
            is_discounted_member_ids: vec![3],
            member_game_counts: HashMap::from([(1, 3), (2, 4)]),
        };
        let set = MemberFlagSet::from_lists(&lists, None);

        let first = set.get(1);
        assert!(first.exclude_food && first.has_penalty);
        assert!(!first.exclude_game && !first.is_discounted);
        assert_eq!(first.game_count, 3);

        let second = set.get(2);
        assert!(second.exclude_game);
        assert_eq!(second.game_count, 4);

        assert!(set.get(3).is_discounted);
        assert_eq!(set.excluded_food_count(&[1, 2, 3]), 2);
    }

    #[test]
    fn test_winner_takes_priority_over_loser() {
        let team = TeamMatch {
            winner_team_member_ids: vec![1, 2],
            loser_team_member_ids: vec![2, 3],
            winner_team_amount: 0,
            loser_team_amount: 0,
        };
        let set = MemberFlagSet::from_lists(&FlagLists::default(), Some(&team));

        assert_eq!(set.get(1).team, Some(TeamSide::Winner));
        assert_eq!(set.get(2).team, Some(TeamSide::Winner));
        assert_eq!(set.get(3).team, Some(TeamSide::Loser));
        assert_eq!(set.get(4).team, None);
    }

    #[test]
    fn test_strategy_serde_tag() {
        let json = serde_json::to_string(&AllocationStrategy::EqualSplit).unwrap();
        assert_eq!(json, r#"{"mode":"equal_split"}"#);

        let parsed: AllocationStrategy =
            serde_json::from_str(r#"{"mode":"per_member","game_fee_per_game":2000}"#).unwrap();
        match parsed {
            AllocationStrategy::PerMember(config) => {
                assert_eq!(config.game_fee_per_game, 2000);
                assert!(config.team_match.is_none());
            }
            other => panic!("unexpected strategy {}", other.name()),
        }
    }
}
