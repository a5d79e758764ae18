//! In-memory store
//!
//! Implements the settlement repository and both directories over a single
//! lock. Used by tests and when the server runs without a database. Every
//! write happens under the write lock, so a settlement and its rows appear
//! together or not at all, and the same constraints as the SQL schema apply.

use async_trait::async_trait;
use chrono::Utc;
use clubpay_core::{
    models::{
        Meeting, MeetingId, MemberId, NewSettlement, Settlement, SettlementId, SettlementMember,
        SettlementMemberDraft, SettlementStatus,
    },
    traits::{MeetingDirectory, MemberDirectory, SettlementRepository},
    AppError, AppResult,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, instrument};

#[derive(Debug, Default)]
struct State {
    last_id: SettlementId,
    settlements: BTreeMap<SettlementId, Settlement>,
    rows: BTreeMap<SettlementId, Vec<SettlementMember>>,
    member_names: HashMap<MemberId, String>,
    meetings: HashMap<MeetingId, Meeting>,
}

/// Lock-guarded in-memory storage
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member display name
    pub fn insert_member(&self, id: MemberId, name: impl Into<String>) {
        self.state.write().member_names.insert(id, name.into());
    }

    /// Register a meeting
    pub fn insert_meeting(&self, meeting: Meeting) {
        self.state.write().meetings.insert(meeting.id, meeting);
    }

    pub fn settlement_count(&self) -> usize {
        self.state.read().settlements.len()
    }

    /// Member rows across all settlements
    pub fn member_row_count(&self) -> usize {
        self.state.read().rows.values().map(Vec::len).sum()
    }

    fn check_batch(members: &[SettlementMemberDraft]) -> AppResult<()> {
        let mut seen = HashSet::with_capacity(members.len());
        for member in members {
            if !seen.insert(member.member_id) {
                return Err(AppError::Database(format!(
                    "Duplicate settlement member: {}",
                    member.member_id
                )));
            }
            if member.amount < 0 {
                return Err(AppError::Database(format!(
                    "Negative amount for member {}",
                    member.member_id
                )));
            }
        }
        Ok(())
    }

    fn with_row<T>(
        &self,
        settlement_id: SettlementId,
        member_id: MemberId,
        update: impl FnOnce(&mut SettlementMember) -> T,
    ) -> Option<T> {
        let mut state = self.state.write();
        state
            .rows
            .get_mut(&settlement_id)?
            .iter_mut()
            .find(|m| m.member_id == member_id)
            .map(update)
    }
}

#[async_trait]
impl SettlementRepository for InMemoryStore {
    #[instrument(skip(self, settlement, members), fields(meeting_id = settlement.meeting_id))]
    async fn create_with_members(
        &self,
        settlement: NewSettlement,
        members: Vec<SettlementMemberDraft>,
    ) -> AppResult<Settlement> {
        Self::check_batch(&members)?;

        let mut state = self.state.write();
        state.last_id += 1;
        let id = state.last_id;

        let settlement = settlement.into_settlement(id, Utc::now());
        let rows = members.into_iter().map(|m| m.into_member(id)).collect();

        state.settlements.insert(id, settlement.clone());
        state.rows.insert(id, rows);

        debug!("Stored settlement {}", id);
        Ok(settlement)
    }

    async fn find_by_id(&self, id: SettlementId) -> AppResult<Option<Settlement>> {
        Ok(self.state.read().settlements.get(&id).cloned())
    }

    async fn find_latest_by_meeting(&self, meeting_id: MeetingId) -> AppResult<Option<Settlement>> {
        let state = self.state.read();
        Ok(state
            .settlements
            .values()
            .filter(|s| s.meeting_id == meeting_id)
            .max_by_key(|s| (s.created_at, s.id))
            .cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> AppResult<(Vec<Settlement>, i64)> {
        let state = self.state.read();
        let page = state
            .settlements
            .values()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, state.settlements.len() as i64))
    }

    async fn find_members(&self, settlement_id: SettlementId) -> AppResult<Vec<SettlementMember>> {
        Ok(self
            .state
            .read()
            .rows
            .get(&settlement_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_member_paid(
        &self,
        settlement_id: SettlementId,
        member_id: MemberId,
        is_paid: bool,
    ) -> AppResult<bool> {
        Ok(self
            .with_row(settlement_id, member_id, |m| m.is_paid = is_paid)
            .is_some())
    }

    async fn update_member_amount(
        &self,
        settlement_id: SettlementId,
        member_id: MemberId,
        amount: i64,
    ) -> AppResult<bool> {
        if amount < 0 {
            return Err(AppError::Database(format!(
                "Negative amount for member {}",
                member_id
            )));
        }
        Ok(self
            .with_row(settlement_id, member_id, |m| m.amount = amount)
            .is_some())
    }

    async fn update_status(&self, id: SettlementId, status: SettlementStatus) -> AppResult<bool> {
        let mut state = self.state.write();
        match state.settlements.get_mut(&id) {
            Some(settlement) => {
                settlement.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: SettlementId) -> AppResult<bool> {
        let mut state = self.state.write();
        let removed = state.settlements.remove(&id).is_some();
        state.rows.remove(&id);
        Ok(removed)
    }
}

#[async_trait]
impl MemberDirectory for InMemoryStore {
    async fn find_names(&self, ids: &[MemberId]) -> AppResult<HashMap<MemberId, String>> {
        let state = self.state.read();
        Ok(ids
            .iter()
            .filter_map(|id| state.member_names.get(id).map(|name| (*id, name.clone())))
            .collect())
    }
}

#[async_trait]
impl MeetingDirectory for InMemoryStore {
    async fn find_meeting(&self, id: MeetingId) -> AppResult<Option<Meeting>> {
        Ok(self.state.read().meetings.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use clubpay_core::models::CostTotals;

    fn draft(member_id: MemberId, amount: i64) -> SettlementMemberDraft {
        SettlementMemberDraft {
            member_id,
            amount,
            exclude_food: false,
            exclude_game: false,
            has_penalty: false,
            is_discounted: false,
            is_paid: false,
        }
    }

    fn new_settlement(meeting_id: MeetingId) -> NewSettlement {
        NewSettlement::new(meeting_id, CostTotals::new(6000, 0, 0), 3000, String::new())
    }

    #[tokio::test]
    async fn test_rejected_batch_leaves_nothing_behind() {
        let store = InMemoryStore::new();

        let result = store
            .create_with_members(new_settlement(1), vec![draft(1, 3000), draft(1, 3000)])
            .await;

        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(store.settlement_count(), 0);
        assert_eq!(store.member_row_count(), 0);
    }

    #[tokio::test]
    async fn test_rows_keep_insertion_order() {
        let store = InMemoryStore::new();
        let settlement = store
            .create_with_members(new_settlement(1), vec![draft(9, 1000), draft(3, 2000)])
            .await
            .unwrap();

        let rows = store.find_members(settlement.id).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.member_id).collect();
        assert_eq!(ids, vec![9, 3]);
        assert!(rows.iter().all(|r| r.settlement_id == settlement.id));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = InMemoryStore::new();
        for meeting in 1..=3 {
            store
                .create_with_members(new_settlement(meeting), vec![draft(1, 1000)])
                .await
                .unwrap();
        }

        let (page, total) = store.list(2, 0).await.unwrap();
        assert_eq!(total, 3);
        let meetings: Vec<_> = page.iter().map(|s| s.meeting_id).collect();
        assert_eq!(meetings, vec![3, 2]);

        let (page, _) = store.list(2, 2).await.unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_directories() {
        let store = InMemoryStore::new();
        store.insert_member(1, "김민수");
        store.insert_meeting(Meeting {
            id: 5,
            date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            location: None,
        });

        let names = store.find_names(&[1, 2]).await.unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[&1], "김민수");

        assert!(store.find_meeting(5).await.unwrap().is_some());
        assert!(store.find_meeting(6).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_rows_report_false() {
        let store = InMemoryStore::new();
        assert!(!store.set_member_paid(1, 1, true).await.unwrap());
        assert!(!store.update_member_amount(1, 1, 10).await.unwrap());
        assert!(!store.update_status(1, SettlementStatus::Completed).await.unwrap());
        assert!(!store.delete(1).await.unwrap());
    }
}
