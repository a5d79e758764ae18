//! Common traits for storage and directories
//!
//! The settlement services only talk to storage through these traits, so the
//! same ledger runs against PostgreSQL or the in-memory store.

use crate::error::AppError;
use crate::models::{
    Meeting, MeetingId, MemberId, NewSettlement, Settlement, SettlementId, SettlementMember,
    SettlementMemberDraft, SettlementStatus,
};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

/// Settlement aggregate storage
#[async_trait]
pub trait SettlementRepository: Send + Sync {
    /// Insert the settlement and all of its member rows atomically
    async fn create_with_members(
        &self,
        settlement: NewSettlement,
        members: Vec<SettlementMemberDraft>,
    ) -> Result<Settlement, AppError>;

    /// Find settlement by ID
    async fn find_by_id(&self, id: SettlementId) -> Result<Option<Settlement>, AppError>;

    /// Most recently created settlement for a meeting
    async fn find_latest_by_meeting(
        &self,
        meeting_id: MeetingId,
    ) -> Result<Option<Settlement>, AppError>;

    /// List settlements, newest first, with the total count
    async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<Settlement>, i64), AppError>;

    /// Member rows of a settlement, in insertion order
    async fn find_members(
        &self,
        settlement_id: SettlementId,
    ) -> Result<Vec<SettlementMember>, AppError>;

    /// Set the paid flag. Returns false when the row does not exist.
    async fn set_member_paid(
        &self,
        settlement_id: SettlementId,
        member_id: MemberId,
        is_paid: bool,
    ) -> Result<bool, AppError>;

    /// Override a member's amount. Returns false when the row does not exist.
    async fn update_member_amount(
        &self,
        settlement_id: SettlementId,
        member_id: MemberId,
        amount: i64,
    ) -> Result<bool, AppError>;

    /// Update settlement status. Returns false when the settlement does not exist.
    async fn update_status(
        &self,
        id: SettlementId,
        status: SettlementStatus,
    ) -> Result<bool, AppError>;

    /// Delete the settlement and its member rows
    async fn delete(&self, id: SettlementId) -> Result<bool, AppError>;
}

/// Member display names
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Names for the given ids; unknown ids are simply missing from the map
    async fn find_names(&self, ids: &[MemberId]) -> Result<HashMap<MemberId, String>, AppError>;
}

/// Meeting date/location lookup
#[async_trait]
pub trait MeetingDirectory: Send + Sync {
    async fn find_meeting(&self, id: MeetingId) -> Result<Option<Meeting>, AppError>;
}

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 1000),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination() {
        let p = Pagination::new(1, 10);
        assert_eq!(p.offset(), 0);
        assert_eq!(p.limit(), 10);

        let p = Pagination::new(3, 20);
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn test_pagination_bounds() {
        let p = Pagination::new(0, 10);
        assert_eq!(p.page, 1);

        let p = Pagination::new(1, 2000);
        assert_eq!(p.per_page, 1000);
    }

    #[test]
    fn test_pagination_meta() {
        assert_eq!(PaginationMeta::new(95, 1, 10).total_pages, 10);
        assert_eq!(PaginationMeta::new(101, 1, 10).total_pages, 11);
        assert_eq!(PaginationMeta::new(0, 1, 10).total_pages, 0);
    }
}
