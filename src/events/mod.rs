//! Lifecycle Event Bus
//!
//! Implements lifecycle notification fan-out using tokio broadcast channels,
//! one channel per event kind, so listeners subscribe to exactly the
//! transitions they care about.
//!
//! # Delivery contract
//!
//! Events are published synchronously after the order store has already been
//! mutated; a publish enqueues to every live subscriber before the
//! reconciliation pass returns. A slow subscriber that overflows its buffer
//! loses only its own backlog (`RecvError::Lagged`), and a dropped
//! subscriber never affects the others or the publisher.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::orders::ClientOrderId;
use crate::types::OrderSide;

/// An order was accepted by the venue and assigned a transaction hash.
#[derive(Debug, Clone, Serialize)]
pub struct OrderCreatedEvent {
    pub client_order_id: ClientOrderId,
    pub exchange_order_id: String,
    pub trading_pair: String,
    pub side: OrderSide,
    pub amount: Decimal,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// An order was confirmed on chain.
#[derive(Debug, Clone, Serialize)]
pub struct OrderFilledEvent {
    pub client_order_id: ClientOrderId,
    /// For AMM swaps the trade id is the transaction hash itself.
    pub exchange_trade_id: String,
    pub executed_amount: Decimal,
    pub executed_price: Decimal,
    pub fee_asset: Option<String>,
    pub fee_amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// An order failed: reverted on chain, rejected at submission, or its
/// submission was presumed lost.
#[derive(Debug, Clone, Serialize)]
pub struct OrderFailedEvent {
    pub client_order_id: ClientOrderId,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// An order was cancelled before reaching the chain.
#[derive(Debug, Clone, Serialize)]
pub struct OrderCancelledEvent {
    pub client_order_id: ClientOrderId,
    pub timestamp: DateTime<Utc>,
}

/// Default per-channel buffer capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Typed pub/sub hub for lifecycle events.
pub struct EventBus {
    order_created: broadcast::Sender<OrderCreatedEvent>,
    order_filled: broadcast::Sender<OrderFilledEvent>,
    order_failed: broadcast::Sender<OrderFailedEvent>,
    order_cancelled: broadcast::Sender<OrderCancelledEvent>,
}

impl EventBus {
    /// Create a bus with the given per-channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (order_created, _) = broadcast::channel(capacity);
        let (order_filled, _) = broadcast::channel(capacity);
        let (order_failed, _) = broadcast::channel(capacity);
        let (order_cancelled, _) = broadcast::channel(capacity);
        Self {
            order_created,
            order_filled,
            order_failed,
            order_cancelled,
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn subscribe_order_created(&self) -> broadcast::Receiver<OrderCreatedEvent> {
        self.order_created.subscribe()
    }

    pub fn subscribe_order_filled(&self) -> broadcast::Receiver<OrderFilledEvent> {
        self.order_filled.subscribe()
    }

    pub fn subscribe_order_failed(&self) -> broadcast::Receiver<OrderFailedEvent> {
        self.order_failed.subscribe()
    }

    pub fn subscribe_order_cancelled(&self) -> broadcast::Receiver<OrderCancelledEvent> {
        self.order_cancelled.subscribe()
    }

    pub fn publish_order_created(&self, event: OrderCreatedEvent) {
        debug!(
            client_order_id = %event.client_order_id,
            exchange_order_id = %event.exchange_order_id,
            listeners = self.order_created.receiver_count(),
            "OrderCreated"
        );
        // A send error only means nobody is subscribed.
        let _ = self.order_created.send(event);
    }

    pub fn publish_order_filled(&self, event: OrderFilledEvent) {
        debug!(
            client_order_id = %event.client_order_id,
            exchange_trade_id = %event.exchange_trade_id,
            listeners = self.order_filled.receiver_count(),
            "OrderFilled"
        );
        let _ = self.order_filled.send(event);
    }

    pub fn publish_order_failed(&self, event: OrderFailedEvent) {
        debug!(
            client_order_id = %event.client_order_id,
            reason = %event.reason,
            listeners = self.order_failed.receiver_count(),
            "OrderFailed"
        );
        let _ = self.order_failed.send(event);
    }

    pub fn publish_order_cancelled(&self, event: OrderCancelledEvent) {
        debug!(
            client_order_id = %event.client_order_id,
            listeners = self.order_cancelled.receiver_count(),
            "OrderCancelled"
        );
        let _ = self.order_cancelled.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill_event(id: &str) -> OrderFilledEvent {
        OrderFilledEvent {
            client_order_id: ClientOrderId::new(id),
            exchange_trade_id: "0xabc".to_string(),
            executed_amount: dec!(100),
            executed_price: dec!(0.002684496),
            fee_asset: Some("ETH".to_string()),
            fee_amount: dec!(0.001),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish_order_filled(fill_event("buy-DAI-WETH-1"));
    }

    #[tokio::test]
    async fn test_all_subscribers_receive_each_event() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe_order_filled();
        let mut rx2 = bus.subscribe_order_filled();

        bus.publish_order_filled(fill_event("buy-DAI-WETH-1"));

        let ev1 = rx1.recv().await.unwrap();
        let ev2 = rx2.recv().await.unwrap();
        assert_eq!(ev1.client_order_id.as_str(), "buy-DAI-WETH-1");
        assert_eq!(ev2.client_order_id.as_str(), "buy-DAI-WETH-1");
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        let rx_dropped = bus.subscribe_order_failed();
        let mut rx_live = bus.subscribe_order_failed();
        drop(rx_dropped);

        bus.publish_order_failed(OrderFailedEvent {
            client_order_id: ClientOrderId::new("buy-DAI-WETH-2"),
            reason: "reverted".to_string(),
            timestamp: Utc::now(),
        });

        let ev = rx_live.recv().await.unwrap();
        assert_eq!(ev.reason, "reverted");
    }

    #[tokio::test]
    async fn test_channels_are_per_event_kind() {
        let bus = EventBus::new();
        let mut filled = bus.subscribe_order_filled();
        let mut cancelled = bus.subscribe_order_cancelled();

        bus.publish_order_cancelled(OrderCancelledEvent {
            client_order_id: ClientOrderId::new("sell-DAI-WETH-3"),
            timestamp: Utc::now(),
        });

        assert!(cancelled.try_recv().is_ok());
        assert!(filled.try_recv().is_err());
    }
}
