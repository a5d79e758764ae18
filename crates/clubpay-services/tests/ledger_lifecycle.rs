//! End-to-end settlement lifecycle against the in-memory store

use chrono::NaiveDate;
use clubpay_core::config::BillingConfig;
use clubpay_core::models::{
    AllocationStrategy, CostTotals, FlagLists, Meeting, MemberId, PerMemberCostConfig,
    SettlementRequest, SettlementStatus, TeamMatch,
};
use clubpay_core::traits::Pagination;
use clubpay_db::InMemoryStore;
use clubpay_services::{SettlementEventKind, SettlementLedger};
use std::collections::HashMap;
use std::sync::Arc;

fn store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for (id, name) in [(1, "김민수"), (2, "이서연"), (3, "박지훈"), (4, "최유진")] {
        store.insert_member(id, name);
    }
    store.insert_meeting(Meeting {
        id: 7,
        date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
        location: Some("강남 볼링장".to_string()),
    });
    store
}

fn counts(entries: &[(MemberId, i64)]) -> HashMap<MemberId, i64> {
    entries.iter().copied().collect()
}

#[tokio::test]
async fn test_team_match_settlement_through_completion() {
    let store = store();
    let ledger = SettlementLedger::new(store.clone(), store.clone(), store.clone());
    let mut events = ledger.subscribe();

    let request = SettlementRequest {
        meeting_id: 7,
        member_ids: vec![1, 2, 3, 4],
        totals: CostTotals::new(32000, 40000, 0),
        memo: "3월 정기전".to_string(),
        strategy: AllocationStrategy::PerMember(PerMemberCostConfig {
            game_fee_per_game: 2500,
            food_per_person: 10000,
            team_match: Some(TeamMatch {
                winner_team_member_ids: vec![1, 2],
                loser_team_member_ids: vec![3, 4],
                winner_team_amount: -1000,
                loser_team_amount: 2000,
            }),
            ..Default::default()
        }),
        flags: FlagLists {
            is_discounted_member_ids: vec![2],
            member_game_counts: counts(&[(1, 3), (2, 3), (3, 3), (4, 3)]),
            ..Default::default()
        },
    };

    let id = ledger.create_settlement(request).await.unwrap();
    let snapshot = ledger.snapshot(id).await.unwrap();

    let amounts: Vec<i64> = snapshot.members.iter().map(|m| m.amount).collect();
    // 7500 + 10000 - 1000, 3750 + 10000 - 1000, 7500 + 10000 + 2000 (rounded up)
    assert_eq!(amounts, vec![17000, 13000, 20000, 20000]);
    assert_eq!(snapshot.settlement.total_amount, 72000);
    assert_eq!(snapshot.settlement.per_person, 18000);

    for member_id in [1, 2, 3] {
        ledger.mark_member_paid(id, member_id).await.unwrap();
    }
    let message = ledger.billing_message(id).await.unwrap();
    assert!(message.contains("날짜: 2026년 3월 14일"));
    assert!(message.contains("장소: 강남 볼링장"));
    assert!(message.contains("총액: 72,000원"));
    assert!(message.contains("1인당: 18,000원"));
    assert!(message.ends_with("미입금: 최유진"));

    ledger.complete_settlement(id).await.unwrap();
    assert_eq!(ledger.status(id).await.unwrap(), SettlementStatus::Completed);

    // A late payment is still recorded after completion
    ledger.mark_member_paid(id, 4).await.unwrap();
    let snapshot = ledger.snapshot(id).await.unwrap();
    assert!(snapshot.is_fully_paid());
    assert_eq!(snapshot.outstanding_amount(), 0);

    let message = ledger.billing_message(id).await.unwrap();
    assert!(!message.contains("미입금"));

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.settlement_id, id);
        kinds.push(event.kind);
    }
    assert_eq!(kinds.first(), Some(&SettlementEventKind::Created));
    assert!(kinds.contains(&SettlementEventKind::Completed));
    assert_eq!(kinds.len(), 6);
}

#[tokio::test]
async fn test_equal_split_message_shows_food_tiers() {
    let store = store();
    let ledger = SettlementLedger::new(store.clone(), store.clone(), store.clone());

    let request = SettlementRequest {
        meeting_id: 7,
        member_ids: vec![1, 2, 3],
        totals: CostTotals::new(9000, 20000, 0),
        memo: String::new(),
        strategy: AllocationStrategy::EqualSplit,
        flags: FlagLists {
            exclude_food_member_ids: vec![3],
            ..Default::default()
        },
    };

    let id = ledger.create_settlement(request).await.unwrap();
    let snapshot = ledger.snapshot(id).await.unwrap();

    let amounts: Vec<i64> = snapshot.members.iter().map(|m| m.amount).collect();
    assert_eq!(amounts, vec![13000, 13000, 3000]);
    assert_eq!(snapshot.settlement.per_person, 13000);
    assert!(snapshot.members[2].exclude_food);

    let message = ledger.billing_message(id).await.unwrap();
    assert!(message.contains("식사 참여: 13,000원"));
    assert!(message.contains("식사 불참: 3,000원"));
    assert!(message.contains("식사 불참자: 박지훈"));
}

#[tokio::test]
async fn test_configured_ledger_formatting() {
    let store = store();
    let config = BillingConfig {
        rounding_unit: 500,
        currency_unit: " KRW".to_string(),
        message_header: "[Club dues]".to_string(),
        ..Default::default()
    };
    let ledger =
        SettlementLedger::from_config(store.clone(), store.clone(), store.clone(), &config);

    let request = SettlementRequest {
        meeting_id: 99,
        member_ids: vec![1, 5],
        totals: CostTotals::new(4000, 0, 0),
        memo: String::new(),
        strategy: AllocationStrategy::PerMember(PerMemberCostConfig {
            game_fee_per_game: 1100,
            ..Default::default()
        }),
        flags: FlagLists {
            member_game_counts: counts(&[(1, 2), (5, 1)]),
            ..Default::default()
        },
    };

    let id = ledger.create_settlement(request).await.unwrap();
    let snapshot = ledger.snapshot(id).await.unwrap();
    let amounts: Vec<i64> = snapshot.members.iter().map(|m| m.amount).collect();
    assert_eq!(amounts, vec![2500, 1500]);

    let message = ledger.billing_message(id).await.unwrap();
    assert!(message.starts_with("[Club dues]"));
    // No meeting row for 99, so no date line
    assert!(!message.contains("날짜"));
    assert!(message.contains("게임비: 4,000 KRW"));
    assert!(message.contains("미입금: 김민수, 회원 #5"));
}

#[tokio::test]
async fn test_list_and_delete() {
    let store = store();
    let ledger = SettlementLedger::new(store.clone(), store.clone(), store.clone());

    let mut ids = Vec::new();
    for meeting_id in 1..=3 {
        let request = SettlementRequest {
            meeting_id,
            member_ids: vec![1, 2],
            totals: CostTotals::new(2000, 0, 0),
            memo: String::new(),
            strategy: AllocationStrategy::EqualSplit,
            flags: FlagLists::default(),
        };
        ids.push(ledger.create_settlement(request).await.unwrap());
    }

    let (page, total) = ledger.list(&Pagination::new(1, 2)).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(page[0].id, ids[2]);

    ledger.delete_settlement(ids[0]).await.unwrap();
    assert_eq!(store.settlement_count(), 2);
    assert_eq!(store.member_row_count(), 4);
    assert!(ledger.latest_for_meeting(1).await.unwrap().is_none());
}
