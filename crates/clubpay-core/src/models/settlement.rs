//! Settlement aggregate models
//!
//! A settlement owns one row per participating member. Rows are written in a
//! single batch when the settlement is created and are only updated afterward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Settlement identifier
pub type SettlementId = i64;

/// Member identifier (owned by the external member directory)
pub type MemberId = i64;

/// Meeting identifier (owned by the external meeting directory)
pub type MeetingId = i64;

/// Settlement status
///
/// The only transition is `Pending -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    /// Collection is in progress
    #[default]
    Pending,
    /// Closed by an operator; does not imply every member paid
    Completed,
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementStatus::Pending => write!(f, "pending"),
            SettlementStatus::Completed => write!(f, "completed"),
        }
    }
}

impl SettlementStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(SettlementStatus::Pending),
            "completed" => Some(SettlementStatus::Completed),
            _ => None,
        }
    }

    /// Status after a completion request. Completed stays completed.
    pub fn complete(self) -> Self {
        SettlementStatus::Completed
    }

    /// Check if the settlement is closed
    pub fn is_final(&self) -> bool {
        matches!(self, SettlementStatus::Completed)
    }
}

/// The three cost components of a settlement, as entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CostTotals {
    pub game_fee: i64,
    pub food_fee: i64,
    pub other_fee: i64,
}

impl CostTotals {
    pub fn new(game_fee: i64, food_fee: i64, other_fee: i64) -> Self {
        Self {
            game_fee,
            food_fee,
            other_fee,
        }
    }

    /// Sum of the three components, `None` on overflow
    #[inline]
    pub fn checked_total(&self) -> Option<i64> {
        self.game_fee
            .checked_add(self.food_fee)?
            .checked_add(self.other_fee)
    }

    /// Sum of the three components, saturating at the `i64` bounds
    ///
    /// Totals that passed allocation validation never saturate.
    #[inline]
    pub fn total(&self) -> i64 {
        self.game_fee
            .saturating_add(self.food_fee)
            .saturating_add(self.other_fee)
    }
}

/// Settlement aggregate root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Unique identifier
    pub id: SettlementId,

    /// Meeting this settlement belongs to (not owned)
    pub meeting_id: MeetingId,

    /// Game fee total as entered
    pub game_fee: i64,

    /// Food fee total as entered
    pub food_fee: i64,

    /// Other fee total as entered
    pub other_fee: i64,

    /// `game_fee + food_fee + other_fee`, fixed at creation
    pub total_amount: i64,

    /// Baseline reference amount; not necessarily what anyone owes
    pub per_person: i64,

    /// Free-form note
    pub memo: String,

    /// Current status
    pub status: SettlementStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Settlement {
    /// The cost components as a `CostTotals`
    pub fn totals(&self) -> CostTotals {
        CostTotals::new(self.game_fee, self.food_fee, self.other_fee)
    }
}

/// Settlement fields known before the row is inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSettlement {
    pub meeting_id: MeetingId,
    pub totals: CostTotals,
    pub per_person: i64,
    pub memo: String,
}

impl NewSettlement {
    pub fn new(meeting_id: MeetingId, totals: CostTotals, per_person: i64, memo: String) -> Self {
        Self {
            meeting_id,
            totals,
            per_person,
            memo,
        }
    }

    /// Always recomputed from the components
    #[inline]
    pub fn total_amount(&self) -> i64 {
        self.totals.total()
    }

    /// Materialize the persisted settlement once an id is assigned
    pub fn into_settlement(self, id: SettlementId, created_at: DateTime<Utc>) -> Settlement {
        Settlement {
            id,
            meeting_id: self.meeting_id,
            game_fee: self.totals.game_fee,
            food_fee: self.totals.food_fee,
            other_fee: self.totals.other_fee,
            total_amount: self.totals.total(),
            per_person: self.per_person,
            memo: self.memo,
            status: SettlementStatus::Pending,
            created_at,
        }
    }
}

/// A member's resolved share of a settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementMember {
    pub settlement_id: SettlementId,
    pub member_id: MemberId,
    /// Owed amount, never negative
    pub amount: i64,
    pub exclude_food: bool,
    pub exclude_game: bool,
    pub has_penalty: bool,
    pub is_discounted: bool,
    pub is_paid: bool,
}

/// Allocation output for one member, before it belongs to a settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementMemberDraft {
    pub member_id: MemberId,
    pub amount: i64,
    pub exclude_food: bool,
    pub exclude_game: bool,
    pub has_penalty: bool,
    pub is_discounted: bool,
    pub is_paid: bool,
}

impl SettlementMemberDraft {
    /// Attach the draft to its owning settlement
    pub fn into_member(self, settlement_id: SettlementId) -> SettlementMember {
        SettlementMember {
            settlement_id,
            member_id: self.member_id,
            amount: self.amount,
            exclude_food: self.exclude_food,
            exclude_game: self.exclude_game,
            has_penalty: self.has_penalty,
            is_discounted: self.is_discounted,
            is_paid: self.is_paid,
        }
    }
}

/// Point-in-time view of a settlement and its member rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSnapshot {
    pub settlement: Settlement,
    pub members: Vec<SettlementMember>,
}

impl SettlementSnapshot {
    pub fn new(settlement: Settlement, members: Vec<SettlementMember>) -> Self {
        Self {
            settlement,
            members,
        }
    }

    /// Rows still waiting for payment, in row order
    pub fn unpaid_members(&self) -> impl Iterator<Item = &SettlementMember> {
        self.members.iter().filter(|m| !m.is_paid)
    }

    /// Sum of all per-member amounts
    pub fn members_total(&self) -> i64 {
        saturating_sum(self.members.iter())
    }

    /// Sum of amounts already paid
    pub fn collected_amount(&self) -> i64 {
        saturating_sum(self.members.iter().filter(|m| m.is_paid))
    }

    /// Sum of amounts still owed
    pub fn outstanding_amount(&self) -> i64 {
        saturating_sum(self.unpaid_members())
    }

    pub fn paid_count(&self) -> usize {
        self.members.iter().filter(|m| m.is_paid).count()
    }

    pub fn is_fully_paid(&self) -> bool {
        self.members.iter().all(|m| m.is_paid)
    }
}

/// Amounts can be overridden one by one, so their sum may exceed `i64`
fn saturating_sum<'a>(members: impl Iterator<Item = &'a SettlementMember>) -> i64 {
    members.fold(0i64, |acc, m| acc.saturating_add(m.amount))
}
