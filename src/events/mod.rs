//! Event feed - best-effort broadcast of bot activity
//!
//! Observers get price updates, balance updates and trade notifications
//! over a `tokio::sync::broadcast` channel, optionally exposed as a
//! WebSocket feed. Publishing never blocks the trading loop and a
//! missing or slow subscriber never affects a trade.

pub mod ws;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::anchor::ActionType;
use crate::domain::stats::TradeRecord;
use crate::ports::models::{Balance, PriceSnapshot};

pub const DEFAULT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    PriceUpdate {
        token_usd: Decimal,
        native_usd: Decimal,
        timestamp: DateTime<Utc>,
    },
    BalanceUpdate {
        native: Decimal,
        token: Decimal,
        timestamp: DateTime<Utc>,
    },
    Trade {
        action: ActionType,
        token_amount: Decimal,
        native_amount: Decimal,
        price_usd: Decimal,
        tx_hash: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },
}

impl FeedEvent {
    pub fn price(snapshot: &PriceSnapshot) -> Self {
        Self::PriceUpdate {
            token_usd: snapshot.token_usd,
            native_usd: snapshot.native_usd,
            timestamp: snapshot.fetched_at,
        }
    }

    pub fn balance(balance: &Balance) -> Self {
        Self::BalanceUpdate {
            native: balance.native,
            token: balance.token,
            timestamp: Utc::now(),
        }
    }

    pub fn trade(record: &TradeRecord) -> Self {
        Self::Trade {
            action: record.action,
            token_amount: record.token_amount,
            native_amount: record.native_amount,
            price_usd: record.price_usd,
            tx_hash: record.tx_hash.clone(),
            success: record.success,
            timestamp: record.timestamp,
        }
    }
}

/// Cloneable handle for publishing feed events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FeedEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Best-effort publish. Having zero subscribers is normal.
    pub fn publish(&self, event: FeedEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = FeedEvent::PriceUpdate {
            token_usd: dec!(1.25),
            native_usd: dec!(3000),
            timestamp: Utc::now(),
        };
        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "price_update");
        assert_eq!(json["token_usd"], "1.25");

        let trade = FeedEvent::Trade {
            action: ActionType::Sell,
            token_amount: dec!(1000),
            native_amount: dec!(0.5),
            price_usd: dec!(1.11),
            tx_hash: "0xabc".into(),
            success: true,
            timestamp: Utc::now(),
        };
        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&trade).unwrap()).unwrap();
        assert_eq!(json["type"], "trade");
        assert_eq!(json["action"], "sell");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(FeedEvent::BalanceUpdate {
            native: dec!(1),
            token: dec!(0),
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(FeedEvent::BalanceUpdate {
            native: dec!(2),
            token: dec!(500),
            timestamp: Utc::now(),
        });
        match rx.recv().await.unwrap() {
            FeedEvent::BalanceUpdate { native, token, .. } => {
                assert_eq!(native, dec!(2));
                assert_eq!(token, dec!(500));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
