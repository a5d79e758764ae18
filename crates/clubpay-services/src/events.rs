//! Settlement change feed
//!
//! The ledger publishes one event per successful mutation. Readers that keep
//! a live view (the websocket feed) re-read the snapshot when one arrives.

use clubpay_core::models::{MemberId, SettlementId};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::constants::FEED_CAPACITY;

/// What changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SettlementEventKind {
    Created,
    PaymentChanged { member_id: MemberId, is_paid: bool },
    AmountAdjusted { member_id: MemberId, amount: i64 },
    Completed,
    Deleted,
}

/// A change to one settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SettlementEvent {
    pub settlement_id: SettlementId,
    #[serde(flatten)]
    pub kind: SettlementEventKind,
}

/// Broadcast channel of settlement events
#[derive(Debug, Clone)]
pub struct SettlementFeed {
    sender: broadcast::Sender<SettlementEvent>,
}

impl Default for SettlementFeed {
    fn default() -> Self {
        Self::new(FEED_CAPACITY)
    }
}

impl SettlementFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; having no subscribers is not an error
    pub fn publish(&self, settlement_id: SettlementId, kind: SettlementEventKind) {
        let event = SettlementEvent {
            settlement_id,
            kind,
        };
        match self.sender.send(event) {
            Ok(receivers) => trace!(settlement_id, receivers, "Published settlement event"),
            Err(_) => trace!(settlement_id, "No subscribers for settlement event"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettlementEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let feed = SettlementFeed::new(4);
        let mut rx = feed.subscribe();

        feed.publish(
            7,
            SettlementEventKind::PaymentChanged {
                member_id: 3,
                is_paid: true,
            },
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.settlement_id, 7);
        assert_eq!(
            event.kind,
            SettlementEventKind::PaymentChanged {
                member_id: 3,
                is_paid: true
            }
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        let feed = SettlementFeed::default();
        feed.publish(1, SettlementEventKind::Completed);
    }

    #[test]
    fn test_event_json_shape() {
        let event = SettlementEvent {
            settlement_id: 2,
            kind: SettlementEventKind::AmountAdjusted {
                member_id: 5,
                amount: 4000,
            },
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["settlement_id"], 2);
        assert_eq!(json["kind"], "amount_adjusted");
        assert_eq!(json["amount"], 4000);
    }
}
