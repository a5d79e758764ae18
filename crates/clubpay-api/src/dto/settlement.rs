//! Settlement DTOs
//!
//! Request and response types for settlement endpoints.

use chrono::{DateTime, Utc};
use clubpay_core::models::{
    AllocationStrategy, CostTotals, FlagLists, MeetingId, MemberId, PerMemberCostConfig,
    Settlement, SettlementId, SettlementMember, SettlementRequest, SettlementSnapshot, TeamMatch,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// Allocation mode selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    /// Per-member computation from game counts and flags
    #[default]
    PerMember,
    /// Headcount split of the entered totals
    EqualSplit,
}

/// Settlement creation request
///
/// Also accepted by the preview endpoint, which runs the allocation without
/// storing anything.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSettlementRequest {
    /// Meeting being settled
    #[validate(range(min = 1))]
    pub meeting_id: MeetingId,

    /// Attendees in display order
    #[validate(length(min = 1, message = "At least one attendee is required"))]
    pub member_ids: Vec<MemberId>,

    #[serde(default)]
    #[validate(range(min = 0))]
    pub game_fee: i64,

    #[serde(default)]
    #[validate(range(min = 0))]
    pub food_fee: i64,

    #[serde(default)]
    #[validate(range(min = 0))]
    pub other_fee: i64,

    #[serde(default)]
    #[validate(length(max = 500))]
    pub memo: String,

    #[serde(default)]
    pub mode: AllocationMode,

    /// Rate per game (per-member mode)
    #[serde(default)]
    #[validate(range(min = 0))]
    pub game_fee_per_game: i64,

    #[serde(default)]
    #[validate(range(min = 0))]
    pub other_per_person: i64,

    #[serde(default)]
    #[validate(range(min = 0))]
    pub food_per_person: i64,

    #[serde(default)]
    #[validate(range(min = 0))]
    pub penalty_amount: i64,

    /// Team amounts apply only when this is set
    #[serde(default)]
    pub is_team_match: bool,

    #[serde(default)]
    pub winner_team_member_ids: Vec<MemberId>,

    #[serde(default)]
    pub loser_team_member_ids: Vec<MemberId>,

    #[serde(default)]
    pub winner_team_amount: i64,

    #[serde(default)]
    pub loser_team_amount: i64,

    #[serde(default)]
    pub exclude_food_member_ids: Vec<MemberId>,

    #[serde(default)]
    pub exclude_game_member_ids: Vec<MemberId>,

    #[serde(default)]
    pub has_penalty_member_ids: Vec<MemberId>,

    #[serde(default)]
    pub is_discounted_member_ids: Vec<MemberId>,

    /// Games played per member; absent members count as zero
    #[serde(default)]
    pub member_game_counts: HashMap<MemberId, i64>,
}

impl CreateSettlementRequest {
    fn strategy(&self) -> AllocationStrategy {
        match self.mode {
            AllocationMode::EqualSplit => AllocationStrategy::EqualSplit,
            AllocationMode::PerMember => AllocationStrategy::PerMember(PerMemberCostConfig {
                game_fee_per_game: self.game_fee_per_game,
                other_per_person: self.other_per_person,
                food_per_person: self.food_per_person,
                penalty_amount: self.penalty_amount,
                team_match: self.is_team_match.then(|| TeamMatch {
                    winner_team_member_ids: self.winner_team_member_ids.clone(),
                    loser_team_member_ids: self.loser_team_member_ids.clone(),
                    winner_team_amount: self.winner_team_amount,
                    loser_team_amount: self.loser_team_amount,
                }),
            }),
        }
    }

    /// Convert into the service-level request
    pub fn into_request(self) -> SettlementRequest {
        let strategy = self.strategy();
        SettlementRequest {
            meeting_id: self.meeting_id,
            member_ids: self.member_ids,
            totals: CostTotals::new(self.game_fee, self.food_fee, self.other_fee),
            memo: self.memo,
            strategy,
            flags: FlagLists {
                exclude_food_member_ids: self.exclude_food_member_ids,
                exclude_game_member_ids: self.exclude_game_member_ids,
                has_penalty_member_ids: self.has_penalty_member_ids,
                is_discounted_member_ids: self.is_discounted_member_ids,
                member_game_counts: self.member_game_counts,
            },
        }
    }
}

/// Manual amount override
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateAmountRequest {
    #[validate(range(min = 0, message = "Amount must not be negative"))]
    pub amount: i64,
}

/// Created settlement reference
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSettlement {
    pub id: SettlementId,
}

/// Settlement header
#[derive(Debug, Clone, Serialize)]
pub struct SettlementResponse {
    pub id: SettlementId,
    pub meeting_id: MeetingId,
    pub game_fee: i64,
    pub food_fee: i64,
    pub other_fee: i64,
    pub total_amount: i64,
    pub per_person: i64,
    pub memo: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Settlement> for SettlementResponse {
    fn from(s: Settlement) -> Self {
        Self {
            id: s.id,
            meeting_id: s.meeting_id,
            game_fee: s.game_fee,
            food_fee: s.food_fee,
            other_fee: s.other_fee,
            total_amount: s.total_amount,
            per_person: s.per_person,
            memo: s.memo,
            status: s.status.to_string(),
            created_at: s.created_at,
        }
    }
}

/// One member row
#[derive(Debug, Clone, Serialize)]
pub struct SettlementMemberResponse {
    pub member_id: MemberId,
    pub amount: i64,
    pub exclude_food: bool,
    pub exclude_game: bool,
    pub has_penalty: bool,
    pub is_discounted: bool,
    pub is_paid: bool,
}

impl From<SettlementMember> for SettlementMemberResponse {
    fn from(m: SettlementMember) -> Self {
        Self {
            member_id: m.member_id,
            amount: m.amount,
            exclude_food: m.exclude_food,
            exclude_game: m.exclude_game,
            has_penalty: m.has_penalty,
            is_discounted: m.is_discounted,
            is_paid: m.is_paid,
        }
    }
}

/// Collection progress
#[derive(Debug, Clone, Serialize)]
pub struct SettlementSummary {
    pub member_count: usize,
    pub paid_count: usize,
    pub members_total: i64,
    pub collected_amount: i64,
    pub outstanding_amount: i64,
    pub is_fully_paid: bool,
}

/// Settlement with member rows and collection progress
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotResponse {
    pub settlement: SettlementResponse,
    pub members: Vec<SettlementMemberResponse>,
    pub summary: SettlementSummary,
}

impl From<SettlementSnapshot> for SnapshotResponse {
    fn from(snapshot: SettlementSnapshot) -> Self {
        let summary = SettlementSummary {
            member_count: snapshot.members.len(),
            paid_count: snapshot.paid_count(),
            members_total: snapshot.members_total(),
            collected_amount: snapshot.collected_amount(),
            outstanding_amount: snapshot.outstanding_amount(),
            is_fully_paid: snapshot.is_fully_paid(),
        };

        Self {
            settlement: snapshot.settlement.into(),
            members: snapshot.members.into_iter().map(Into::into).collect(),
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clubpay_core::models::{NewSettlement, SettlementStatus};

    fn body(json: &str) -> CreateSettlementRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_team_match_only_when_flagged() {
        let req = body(
            r#"{
                "meeting_id": 1,
                "member_ids": [1, 2],
                "game_fee": 10000,
                "winner_team_member_ids": [1],
                "loser_team_member_ids": [2],
                "winner_team_amount": 1000,
                "loser_team_amount": 3000
            }"#,
        );
        match req.clone().into_request().strategy {
            AllocationStrategy::PerMember(config) => assert!(config.team_match.is_none()),
            other => panic!("unexpected strategy: {:?}", other),
        }

        let mut flagged = req;
        flagged.is_team_match = true;
        match flagged.into_request().strategy {
            AllocationStrategy::PerMember(config) => {
                let team = config.team_match.unwrap();
                assert_eq!(team.winner_team_member_ids, vec![1]);
                assert_eq!(team.loser_team_amount, 3000);
            }
            other => panic!("unexpected strategy: {:?}", other),
        }
    }

    #[test]
    fn test_equal_split_mode_and_flags() {
        let req = body(
            r#"{
                "meeting_id": 4,
                "member_ids": [1, 2, 3],
                "game_fee": 10000,
                "food_fee": 9000,
                "mode": "equal_split",
                "exclude_food_member_ids": [3],
                "member_game_counts": {"1": 2}
            }"#,
        );
        let request = req.into_request();
        assert_eq!(request.strategy, AllocationStrategy::EqualSplit);
        assert_eq!(request.totals, CostTotals::new(10000, 9000, 0));
        assert_eq!(request.flags.exclude_food_member_ids, vec![3]);
        assert_eq!(request.flags.member_game_counts.get(&1), Some(&2));
    }

    #[test]
    fn test_validation_rejects_bad_input() {
        let req = body(r#"{"meeting_id": 1, "member_ids": []}"#);
        assert!(req.validate().is_err());

        let req = body(r#"{"meeting_id": 1, "member_ids": [1], "food_fee": -1}"#);
        assert!(req.validate().is_err());

        let req = body(r#"{"meeting_id": 1, "member_ids": [1], "loser_team_amount": -500}"#);
        assert!(req.validate().is_ok());

        assert!(UpdateAmountRequest { amount: -1 }.validate().is_err());
        assert!(UpdateAmountRequest { amount: 0 }.validate().is_ok());
    }

    #[test]
    fn test_snapshot_response_summary() {
        let settlement =
            NewSettlement::new(1, CostTotals::new(6000, 0, 0), 3000, String::new())
                .into_settlement(7, Utc::now());
        let member = |member_id, is_paid| SettlementMember {
            settlement_id: 7,
            member_id,
            amount: 3000,
            exclude_food: false,
            exclude_game: false,
            has_penalty: false,
            is_discounted: false,
            is_paid,
        };
        let snapshot = SettlementSnapshot::new(settlement, vec![member(1, true), member(2, false)]);

        let response = SnapshotResponse::from(snapshot);
        assert_eq!(response.settlement.status, SettlementStatus::Pending.to_string());
        assert_eq!(response.summary.paid_count, 1);
        assert_eq!(response.summary.collected_amount, 3000);
        assert_eq!(response.summary.outstanding_amount, 3000);
        assert!(!response.summary.is_fully_paid);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["settlement"]["id"], 7);
        assert_eq!(json["members"][1]["is_paid"], false);
    }
}
