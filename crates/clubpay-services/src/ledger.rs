//! Settlement ledger service
//!
//! Owns the settlement lifecycle:
//! - Create a settlement from an allocation, atomically with its member rows
//! - Toggle member payment flags
//! - Override a member's amount
//! - Complete (one-way) and delete settlements
//! - Render the billing message for the current state
//!
//! Payment flags may still change after completion, and completion does not
//! require every member to have paid.

use clubpay_core::{
    config::BillingConfig,
    models::{
        MeetingId, MemberId, NewSettlement, Settlement, SettlementId, SettlementRequest,
        SettlementSnapshot, SettlementStatus,
    },
    traits::{MeetingDirectory, MemberDirectory, Pagination, SettlementRepository},
    AppError, AppResult,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::allocation::{Allocation, FeeAllocationEngine};
use crate::billing_message::{BillingDetails, BillingMessageFormatter};
use crate::events::{SettlementEvent, SettlementEventKind, SettlementFeed};

/// Settlement ledger
pub struct SettlementLedger {
    repo: Arc<dyn SettlementRepository>,
    members: Arc<dyn MemberDirectory>,
    meetings: Arc<dyn MeetingDirectory>,
    engine: FeeAllocationEngine,
    formatter: BillingMessageFormatter,
    feed: SettlementFeed,
}

impl SettlementLedger {
    /// Create a ledger with default engine, formatter and feed settings
    pub fn new(
        repo: Arc<dyn SettlementRepository>,
        members: Arc<dyn MemberDirectory>,
        meetings: Arc<dyn MeetingDirectory>,
    ) -> Self {
        Self {
            repo,
            members,
            meetings,
            engine: FeeAllocationEngine::default(),
            formatter: BillingMessageFormatter::default(),
            feed: SettlementFeed::default(),
        }
    }

    /// Create a ledger configured from the billing section
    pub fn from_config(
        repo: Arc<dyn SettlementRepository>,
        members: Arc<dyn MemberDirectory>,
        meetings: Arc<dyn MeetingDirectory>,
        config: &BillingConfig,
    ) -> Self {
        Self {
            repo,
            members,
            meetings,
            engine: FeeAllocationEngine::new(config.rounding_unit),
            formatter: BillingMessageFormatter::new(
                config.message_header.clone(),
                config.currency_unit.clone(),
            ),
            feed: SettlementFeed::new(config.feed_capacity),
        }
    }

    /// Subscribe to settlement changes
    pub fn subscribe(&self) -> broadcast::Receiver<SettlementEvent> {
        self.feed.subscribe()
    }

    /// Run the requested allocation without persisting anything
    pub fn preview(&self, request: &SettlementRequest) -> AppResult<Allocation> {
        self.engine.plan(request)
    }

    /// Allocate and persist a settlement with all of its member rows
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidInput` for an empty or duplicated attendee list or
    ///   negative costs
    /// - storage errors if the aggregate could not be written; nothing is
    ///   persisted in that case
    #[instrument(skip(self, request), fields(meeting_id = request.meeting_id))]
    pub async fn create_settlement(&self, request: SettlementRequest) -> AppResult<SettlementId> {
        let allocation = self.engine.plan(&request)?;

        info!(
            "Creating {} settlement for meeting {}: {} members, total {}",
            request.strategy.name(),
            request.meeting_id,
            allocation.members.len(),
            allocation.total_amount
        );

        let new_settlement = NewSettlement::new(
            request.meeting_id,
            request.totals,
            allocation.per_person,
            request.memo,
        );

        let settlement = self
            .repo
            .create_with_members(new_settlement, allocation.members)
            .await?;

        info!(
            settlement_id = settlement.id,
            "Settlement created for meeting {}", settlement.meeting_id
        );
        self.feed.publish(settlement.id, SettlementEventKind::Created);

        Ok(settlement.id)
    }

    async fn require_settlement(&self, id: SettlementId) -> AppResult<Settlement> {
        self.repo.find_by_id(id).await?.ok_or_else(|| {
            debug!("Settlement {} not found", id);
            AppError::SettlementNotFound(id)
        })
    }

    /// Current settlement with its member rows
    #[instrument(skip(self))]
    pub async fn snapshot(&self, id: SettlementId) -> AppResult<SettlementSnapshot> {
        let settlement = self.require_settlement(id).await?;
        let members = self.repo.find_members(id).await?;
        Ok(SettlementSnapshot::new(settlement, members))
    }

    /// Latest settlement recorded for a meeting, if any
    #[instrument(skip(self))]
    pub async fn latest_for_meeting(
        &self,
        meeting_id: MeetingId,
    ) -> AppResult<Option<SettlementSnapshot>> {
        match self.repo.find_latest_by_meeting(meeting_id).await? {
            Some(settlement) => {
                let members = self.repo.find_members(settlement.id).await?;
                Ok(Some(SettlementSnapshot::new(settlement, members)))
            }
            None => Ok(None),
        }
    }

    /// Page through settlements, newest first
    pub async fn list(&self, pagination: &Pagination) -> AppResult<(Vec<Settlement>, i64)> {
        self.repo
            .list(pagination.limit(), pagination.offset())
            .await
    }

    pub async fn mark_member_paid(
        &self,
        settlement_id: SettlementId,
        member_id: MemberId,
    ) -> AppResult<()> {
        self.set_paid(settlement_id, member_id, true).await
    }

    pub async fn mark_member_unpaid(
        &self,
        settlement_id: SettlementId,
        member_id: MemberId,
    ) -> AppResult<()> {
        self.set_paid(settlement_id, member_id, false).await
    }

    #[instrument(skip(self))]
    async fn set_paid(
        &self,
        settlement_id: SettlementId,
        member_id: MemberId,
        is_paid: bool,
    ) -> AppResult<()> {
        let settlement = self.require_settlement(settlement_id).await?;
        if settlement.status.is_final() {
            debug!(settlement_id, "Changing payment on a completed settlement");
        }

        if !self
            .repo
            .set_member_paid(settlement_id, member_id, is_paid)
            .await?
        {
            warn!(settlement_id, member_id, "Payment toggle for unknown member");
            return Err(AppError::SettlementMemberNotFound {
                settlement_id,
                member_id,
            });
        }

        info!(settlement_id, member_id, is_paid, "Payment flag updated");
        self.feed.publish(
            settlement_id,
            SettlementEventKind::PaymentChanged { member_id, is_paid },
        );
        Ok(())
    }

    /// Close the settlement. Unpaid members do not block completion, and
    /// completing an already completed settlement succeeds without a write.
    #[instrument(skip(self))]
    pub async fn complete_settlement(&self, settlement_id: SettlementId) -> AppResult<()> {
        let settlement = self.require_settlement(settlement_id).await?;

        if settlement.status.is_final() {
            debug!(settlement_id, "Settlement already completed");
            return Ok(());
        }

        let next = settlement.status.complete();
        if !self.repo.update_status(settlement_id, next).await? {
            return Err(AppError::SettlementNotFound(settlement_id));
        }

        info!(settlement_id, "Settlement completed");
        self.feed.publish(settlement_id, SettlementEventKind::Completed);
        Ok(())
    }

    /// Remove the settlement together with its member rows
    #[instrument(skip(self))]
    pub async fn delete_settlement(&self, settlement_id: SettlementId) -> AppResult<()> {
        if !self.repo.delete(settlement_id).await? {
            warn!(settlement_id, "Delete requested for missing settlement");
            return Err(AppError::SettlementNotFound(settlement_id));
        }

        info!(settlement_id, "Settlement deleted");
        self.feed.publish(settlement_id, SettlementEventKind::Deleted);
        Ok(())
    }

    /// Manually override one member's amount. Totals are not re-validated.
    ///
    /// # Errors
    ///
    /// `AppError::InvalidInput` for a negative amount, not-found errors for a
    /// missing settlement or member row.
    #[instrument(skip(self))]
    pub async fn update_member_amount(
        &self,
        settlement_id: SettlementId,
        member_id: MemberId,
        amount: i64,
    ) -> AppResult<()> {
        if amount < 0 {
            return Err(AppError::InvalidInput(format!(
                "Amount must not be negative: {}",
                amount
            )));
        }

        self.require_settlement(settlement_id).await?;

        if !self
            .repo
            .update_member_amount(settlement_id, member_id, amount)
            .await?
        {
            return Err(AppError::SettlementMemberNotFound {
                settlement_id,
                member_id,
            });
        }

        info!(settlement_id, member_id, amount, "Member amount overridden");
        self.feed.publish(
            settlement_id,
            SettlementEventKind::AmountAdjusted { member_id, amount },
        );
        Ok(())
    }

    /// Current settlement status
    pub async fn status(&self, settlement_id: SettlementId) -> AppResult<SettlementStatus> {
        Ok(self.require_settlement(settlement_id).await?.status)
    }

    /// Resolve names and meeting details for a snapshot
    pub async fn billing_details(
        &self,
        snapshot: &SettlementSnapshot,
    ) -> AppResult<BillingDetails> {
        let ids: Vec<MemberId> = snapshot.members.iter().map(|m| m.member_id).collect();
        let names = self.members.find_names(&ids).await?;
        let meeting = self
            .meetings
            .find_meeting(snapshot.settlement.meeting_id)
            .await?;

        Ok(BillingDetails::from_snapshot(snapshot, &names, meeting))
    }

    /// Render the billing message for a snapshot
    pub async fn generate_billing_message(
        &self,
        snapshot: &SettlementSnapshot,
    ) -> AppResult<String> {
        let details = self.billing_details(snapshot).await?;
        Ok(self.formatter.format(&details))
    }

    /// Render the billing message for the settlement's current state
    #[instrument(skip(self))]
    pub async fn billing_message(&self, settlement_id: SettlementId) -> AppResult<String> {
        let snapshot = self.snapshot(settlement_id).await?;
        self.generate_billing_message(&snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clubpay_core::models::{AllocationStrategy, CostTotals, FlagLists, PerMemberCostConfig};
    use clubpay_db::InMemoryStore;
    use std::collections::HashMap;

    fn ledger() -> (SettlementLedger, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let ledger = SettlementLedger::new(store.clone(), store.clone(), store.clone());
        (ledger, store)
    }

    fn request(member_ids: Vec<MemberId>) -> SettlementRequest {
        let counts: HashMap<MemberId, i64> = member_ids.iter().map(|id| (*id, 3)).collect();
        SettlementRequest {
            meeting_id: 1,
            member_ids,
            totals: CostTotals::new(18000, 0, 0),
            memo: "정기전".to_string(),
            strategy: AllocationStrategy::PerMember(PerMemberCostConfig {
                game_fee_per_game: 2000,
                ..Default::default()
            }),
            flags: FlagLists {
                member_game_counts: counts,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_create_persists_allocation() {
        let (ledger, _) = ledger();

        let id = ledger.create_settlement(request(vec![1, 2, 3])).await.unwrap();
        let snapshot = ledger.snapshot(id).await.unwrap();

        assert_eq!(snapshot.settlement.total_amount, 18000);
        assert_eq!(snapshot.settlement.per_person, 6000);
        assert_eq!(snapshot.settlement.status, SettlementStatus::Pending);
        assert_eq!(snapshot.members.len(), 3);
        assert!(snapshot.members.iter().all(|m| m.amount == 6000 && !m.is_paid));
    }

    #[tokio::test]
    async fn test_invalid_request_persists_nothing() {
        let (ledger, store) = ledger();

        let err = ledger
            .create_settlement(request(vec![1, 1]))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(store.settlement_count(), 0);
    }

    #[tokio::test]
    async fn test_overflowing_request_persists_nothing() {
        let (ledger, store) = ledger();

        let mut per_member = request(vec![1]);
        per_member.flags.member_game_counts = HashMap::from([(1, i64::MAX / 1000)]);
        let err = ledger.create_settlement(per_member).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let mut equal_split = request(vec![1, 2]);
        equal_split.strategy = AllocationStrategy::EqualSplit;
        equal_split.totals = CostTotals::new(i64::MAX, 1, 0);
        let err = ledger.create_settlement(equal_split).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        assert_eq!(store.settlement_count(), 0);
        assert_eq!(store.member_row_count(), 0);
    }

    #[tokio::test]
    async fn test_complete_with_unpaid_members_is_idempotent() {
        let (ledger, _) = ledger();
        let id = ledger.create_settlement(request(vec![1, 2])).await.unwrap();
        ledger.mark_member_paid(id, 1).await.unwrap();

        ledger.complete_settlement(id).await.unwrap();
        assert_eq!(ledger.status(id).await.unwrap(), SettlementStatus::Completed);

        ledger.complete_settlement(id).await.unwrap();
        assert_eq!(ledger.status(id).await.unwrap(), SettlementStatus::Completed);
    }

    #[tokio::test]
    async fn test_payment_toggle_after_completion() {
        let (ledger, _) = ledger();
        let id = ledger.create_settlement(request(vec![1, 2])).await.unwrap();
        ledger.complete_settlement(id).await.unwrap();

        ledger.mark_member_paid(id, 2).await.unwrap();
        ledger.mark_member_unpaid(id, 2).await.unwrap();
        ledger.mark_member_paid(id, 2).await.unwrap();

        let snapshot = ledger.snapshot(id).await.unwrap();
        assert!(snapshot.members.iter().find(|m| m.member_id == 2).unwrap().is_paid);
    }

    #[tokio::test]
    async fn test_not_found_errors() {
        let (ledger, _) = ledger();

        assert!(matches!(
            ledger.complete_settlement(99).await,
            Err(AppError::SettlementNotFound(99))
        ));
        assert!(matches!(
            ledger.mark_member_paid(99, 1).await,
            Err(AppError::SettlementNotFound(99))
        ));
        assert!(matches!(
            ledger.delete_settlement(99).await,
            Err(AppError::SettlementNotFound(99))
        ));
        assert!(matches!(
            ledger.status(99).await,
            Err(AppError::SettlementNotFound(99))
        ));

        let id = ledger.create_settlement(request(vec![1])).await.unwrap();
        assert!(matches!(
            ledger.mark_member_paid(id, 42).await,
            Err(AppError::SettlementMemberNotFound { member_id: 42, .. })
        ));
        assert!(matches!(
            ledger.update_member_amount(id, 42, 1000).await,
            Err(AppError::SettlementMemberNotFound { member_id: 42, .. })
        ));
    }

    #[tokio::test]
    async fn test_update_member_amount() {
        let (ledger, _) = ledger();
        let id = ledger.create_settlement(request(vec![1, 2])).await.unwrap();

        ledger.update_member_amount(id, 2, 1500).await.unwrap();
        let snapshot = ledger.snapshot(id).await.unwrap();
        let row = snapshot.members.iter().find(|m| m.member_id == 2).unwrap();
        assert_eq!(row.amount, 1500);
        // Entered totals are left alone
        assert_eq!(snapshot.settlement.total_amount, 18000);

        assert!(matches!(
            ledger.update_member_amount(id, 2, -1).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let (ledger, store) = ledger();
        let id = ledger.create_settlement(request(vec![1, 2])).await.unwrap();

        ledger.delete_settlement(id).await.unwrap();

        assert!(matches!(
            ledger.snapshot(id).await,
            Err(AppError::SettlementNotFound(_))
        ));
        assert_eq!(store.member_row_count(), 0);
    }

    #[tokio::test]
    async fn test_events_published_on_mutation() {
        let (ledger, _) = ledger();
        let mut rx = ledger.subscribe();

        let id = ledger.create_settlement(request(vec![1])).await.unwrap();
        ledger.mark_member_paid(id, 1).await.unwrap();
        ledger.complete_settlement(id).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().kind, SettlementEventKind::Created);
        assert_eq!(
            rx.recv().await.unwrap().kind,
            SettlementEventKind::PaymentChanged {
                member_id: 1,
                is_paid: true
            }
        );
        assert_eq!(rx.recv().await.unwrap().kind, SettlementEventKind::Completed);
    }

    #[tokio::test]
    async fn test_billing_message_tracks_payments() {
        let (ledger, store) = ledger();
        store.insert_member(1, "김민수");
        store.insert_member(2, "이서연");

        let id = ledger.create_settlement(request(vec![1, 2])).await.unwrap();
        let text = ledger.billing_message(id).await.unwrap();
        assert!(text.contains("미입금: 김민수, 이서연"));

        ledger.mark_member_paid(id, 1).await.unwrap();
        let text = ledger.billing_message(id).await.unwrap();
        assert!(text.contains("미입금: 이서연"));
        assert!(!text.contains("미입금: 김민수"));
    }

    #[tokio::test]
    async fn test_latest_for_meeting() {
        let (ledger, _) = ledger();
        assert!(ledger.latest_for_meeting(1).await.unwrap().is_none());

        let first = ledger.create_settlement(request(vec![1])).await.unwrap();
        let second = ledger.create_settlement(request(vec![1, 2])).await.unwrap();
        assert_ne!(first, second);

        let latest = ledger.latest_for_meeting(1).await.unwrap().unwrap();
        assert_eq!(latest.settlement.id, second);
        assert_eq!(latest.members.len(), 2);
    }
}
