//! Domain models for ClubPay

pub mod allocation;
pub mod directory;
pub mod settlement;

pub use allocation::{
    AllocationStrategy, FlagLists, MemberFlagSet, MemberFlags, PerMemberCostConfig,
    SettlementRequest, TeamMatch, TeamSide,
};
pub use directory::Meeting;
pub use settlement::{
    CostTotals, MeetingId, MemberId, NewSettlement, Settlement, SettlementId, SettlementMember,
    SettlementMemberDraft, SettlementSnapshot, SettlementStatus,
};
