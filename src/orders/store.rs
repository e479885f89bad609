//! Order tracking with a thread-safe, monotonic state machine.
//!
//! The store owns every order the engine is responsible for, keyed by the
//! locally generated client order id. All state transitions go through the
//! store, and each transition method returns the updated record only when
//! the transition actually happened. That return value is the
//! exactly-once gate: callers emit a lifecycle event if and only if they
//! get `Some` back, so duplicate poll results can never double-fire.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::types::{ClientOrderId, InFlightOrder, OrderState};
use crate::gateway::FillDetails;

/// Errors that can occur during order tracking operations.
#[derive(Error, Debug, Clone)]
pub enum OrderTrackingError {
    /// A client order id was registered twice. Programmer error; the
    /// existing record is never overwritten.
    #[error("Duplicate client order id: {0}")]
    Duplicate(ClientOrderId),

    /// Order not found in the store
    #[error("Order not found: {0}")]
    NotFound(ClientOrderId),

    /// The order references a pair outside the configured set
    #[error("Unsupported trading pair: {0}")]
    UnsupportedPair(String),
}

/// Thread-safe store of in-flight orders.
///
/// # Thread Safety
///
/// Uses `RwLock` for concurrent reads with exclusive writes. Snapshots
/// handed out by `all_non_terminal` are clones taken at call time, so
/// concurrent mutation during iteration never races.
///
/// # Memory Management
///
/// Terminal orders are retained for a grace period so late duplicate poll
/// results land on a record that is already terminal (and get discarded)
/// instead of on a missing one. `evict_expired` removes them afterwards
/// and never fires events.
#[derive(Clone, Default)]
pub struct OrderStore {
    orders: Arc<RwLock<HashMap<ClientOrderId, InFlightOrder>>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new order.
    ///
    /// Call this before any venue I/O so a crash mid-submission still
    /// leaves a record behind. Fails loudly on id collision.
    pub async fn start_tracking(&self, order: InFlightOrder) -> Result<(), OrderTrackingError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.client_order_id) {
            return Err(OrderTrackingError::Duplicate(order.client_order_id));
        }
        debug!(
            client_order_id = %order.client_order_id,
            trading_pair = %order.trading_pair,
            side = %order.side,
            "Order registered in store"
        );
        orders.insert(order.client_order_id.clone(), order);
        Ok(())
    }

    /// Remove an order. Removal is always safe; absent ids are a no-op.
    pub async fn stop_tracking(&self, id: &ClientOrderId) -> bool {
        let mut orders = self.orders.write().await;
        orders.remove(id).is_some()
    }

    /// Get a snapshot of one order.
    pub async fn get(&self, id: &ClientOrderId) -> Option<InFlightOrder> {
        let orders = self.orders.read().await;
        orders.get(id).cloned()
    }

    /// Snapshot of all orders not yet in a terminal state.
    pub async fn all_non_terminal(&self) -> Vec<InFlightOrder> {
        let orders = self.orders.read().await;
        orders
            .values()
            .filter(|o| !o.is_terminal())
            .cloned()
            .collect()
    }

    /// Count of all tracked orders, terminal included.
    #[must_use]
    pub async fn len(&self) -> usize {
        let orders = self.orders.read().await;
        orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Count of non-terminal orders.
    #[must_use]
    pub async fn active_count(&self) -> usize {
        let orders = self.orders.read().await;
        orders.values().filter(|o| !o.is_terminal()).count()
    }

    /// Record the venue-assigned transaction hash.
    ///
    /// First write wins; a second write with a different hash is a
    /// defensive no-op, as is a write landing on an order that settled
    /// while the submission call was in flight.
    pub async fn set_exchange_order_id(
        &self,
        id: &ClientOrderId,
        tx_hash: &str,
    ) -> Option<InFlightOrder> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(id)?;
        if order.is_terminal() {
            debug!(
                client_order_id = %id,
                tx_hash = %tx_hash,
                "Late submission result discarded: order already settled"
            );
            return None;
        }
        match &order.exchange_order_id {
            None => {
                order.exchange_order_id = Some(tx_hash.to_string());
                Some(order.clone())
            }
            Some(existing) => {
                if existing != tx_hash {
                    warn!(
                        client_order_id = %id,
                        existing = %existing,
                        ignored = %tx_hash,
                        "Attempted to overwrite exchange order id"
                    );
                }
                None
            }
        }
    }

    /// Advance `PendingCreate -> Created`.
    pub async fn mark_created(
        &self,
        id: &ClientOrderId,
        now: DateTime<Utc>,
    ) -> Option<InFlightOrder> {
        self.transition(id, now, |order| {
            if order.state != OrderState::PendingCreate {
                return false;
            }
            order.state = OrderState::Created;
            true
        })
        .await
    }

    /// Apply a confirmed fill. Idempotent: returns `None` if the order is
    /// already terminal, and no fields change.
    pub async fn apply_fill(
        &self,
        id: &ClientOrderId,
        fill: &FillDetails,
        now: DateTime<Utc>,
    ) -> Option<InFlightOrder> {
        self.transition(id, now, |order| {
            if order.is_terminal() {
                return false;
            }
            order.state = OrderState::Filled;
            order.executed_amount = fill.executed_amount;
            order.executed_price = Some(fill.executed_price);
            order.fee_paid = fill.fee;
            if let Some(asset) = &fill.fee_asset {
                order.fee_asset = Some(asset.clone());
            }
            true
        })
        .await
    }

    /// Apply a failure. Idempotent under the same rule as `apply_fill`.
    pub async fn apply_failure(
        &self,
        id: &ClientOrderId,
        now: DateTime<Utc>,
    ) -> Option<InFlightOrder> {
        self.transition(id, now, |order| {
            if order.is_terminal() {
                return false;
            }
            order.state = OrderState::Failed;
            true
        })
        .await
    }

    /// Apply a local cancellation. Idempotent under the same rule.
    pub async fn apply_cancel(
        &self,
        id: &ClientOrderId,
        now: DateTime<Utc>,
    ) -> Option<InFlightOrder> {
        self.transition(id, now, |order| {
            if order.is_terminal() {
                return false;
            }
            order.state = OrderState::Cancelled;
            true
        })
        .await
    }

    /// Record that a reconciliation pass observed the order still pending.
    pub async fn touch(&self, id: &ClientOrderId, now: DateTime<Utc>) {
        let mut orders = self.orders.write().await;
        if let Some(order) = orders.get_mut(id) {
            order.updated_at = now;
        }
    }

    /// Remove terminal orders whose last update is older than `grace`.
    ///
    /// Returns the number of evicted orders. Never emits events.
    pub async fn evict_expired(&self, now: DateTime<Utc>, grace: Duration) -> usize {
        let cutoff = now - grace;
        let mut orders = self.orders.write().await;

        let to_remove: Vec<ClientOrderId> = orders
            .iter()
            .filter(|(_, o)| o.is_terminal() && o.updated_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &to_remove {
            orders.remove(id);
        }

        if !to_remove.is_empty() {
            debug!(count = to_remove.len(), "Evicted expired terminal orders");
        }
        to_remove.len()
    }

    async fn transition<F>(
        &self,
        id: &ClientOrderId,
        now: DateTime<Utc>,
        apply: F,
    ) -> Option<InFlightOrder>
    where
        F: FnOnce(&mut InFlightOrder) -> bool,
    {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(id)?;
        let old_state = order.state;
        if !apply(order) {
            debug!(
                client_order_id = %id,
                state = %old_state,
                "Transition discarded: order already settled"
            );
            return None;
        }
        order.updated_at = now;
        info!(
            client_order_id = %id,
            trading_pair = %order.trading_pair,
            old_state = %old_state,
            new_state = %order.state,
            "Order state updated"
        );
        Some(order.clone())
    }
}
