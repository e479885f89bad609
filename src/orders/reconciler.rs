//! Order status reconciliation against the gateway.
//!
//! The venue never pushes notifications; order state is inferred by polling
//! transaction status and comparing against locally held records. Each pass
//! snapshots the non-terminal orders, fans out a bounded batch of status
//! queries, and applies results back through the store, which guarantees a
//! terminal transition (and its event) happens at most once per order no
//! matter how often the same poll result shows up.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::store::OrderStore;
use super::types::ClientOrderId;
use crate::events::{EventBus, OrderFailedEvent, OrderFilledEvent};
use crate::gateway::{FillDetails, GatewayApi, TxStatus};
use crate::quant::{quantize_asset, QuantumMap};
use crate::types::TradingPair;

/// Outcome counters for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSweep {
    /// Status results applied or discarded
    pub polled: usize,
    /// Orders transitioned to Filled this pass
    pub filled: usize,
    /// Orders transitioned to Failed from venue results
    pub failed: usize,
    /// Orders failed locally because their submission timed out
    pub timed_out: usize,
    /// Orders skipped (unrecognized trading pair)
    pub skipped: usize,
    /// Transport errors observed (order left for the next tick)
    pub errors: usize,
}

/// Polls transaction status for every in-flight order and advances the
/// per-order state machine.
pub struct StatusReconciler<G> {
    gateway: Arc<G>,
    store: OrderStore,
    bus: Arc<EventBus>,
    quantums: Arc<QuantumMap>,
    known_pairs: HashSet<String>,
    submission_timeout: Duration,
    poll_concurrency: usize,
    shutdown: Arc<AtomicBool>,
}

impl<G: GatewayApi + 'static> StatusReconciler<G> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<G>,
        store: OrderStore,
        bus: Arc<EventBus>,
        quantums: Arc<QuantumMap>,
        known_pairs: HashSet<String>,
        submission_timeout: Duration,
        poll_concurrency: usize,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            gateway,
            store,
            bus,
            quantums,
            known_pairs,
            submission_timeout,
            poll_concurrency: poll_concurrency.max(1),
            shutdown,
        }
    }

    /// Run one reconciliation pass.
    ///
    /// The pass works on a snapshot taken at entry; results are applied
    /// only to orders still tracked and non-terminal at application time.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> StatusSweep {
        let snapshot = self.store.all_non_terminal().await;
        let mut sweep = StatusSweep::default();
        let mut to_poll: Vec<(ClientOrderId, String, String)> = Vec::new();

        for order in snapshot {
            if !self.known_pairs.contains(&order.trading_pair) {
                warn!(
                    client_order_id = %order.client_order_id,
                    trading_pair = %order.trading_pair,
                    "Skipping order on unrecognized trading pair"
                );
                sweep.skipped += 1;
                continue;
            }
            match &order.exchange_order_id {
                // Still awaiting submission confirmation. Nothing to query;
                // fail locally once the submission timeout elapses.
                None => {
                    if now - order.created_at >= self.submission_timeout {
                        self.fail_order(&order.client_order_id, "submission timed out", now)
                            .await;
                        sweep.timed_out += 1;
                    }
                }
                Some(tx_hash) => to_poll.push((
                    order.client_order_id.clone(),
                    tx_hash.clone(),
                    order.trading_pair.clone(),
                )),
            }
        }

        if to_poll.is_empty() {
            return sweep;
        }

        // Bounded fan-out: one slow poll must not starve the rest.
        let semaphore = Arc::new(Semaphore::new(self.poll_concurrency));
        let mut queries = JoinSet::new();
        for (id, tx_hash, pair) in to_poll {
            let gateway = Arc::clone(&self.gateway);
            let semaphore = Arc::clone(&semaphore);
            queries.spawn(async move {
                // Semaphore is never closed while queries run.
                let _permit = semaphore.acquire_owned().await.ok();
                let status = gateway.get_transaction_status(&tx_hash).await;
                (id, tx_hash, pair, status)
            });
        }

        while let Some(joined) = queries.join_next().await {
            // Results for a store that may be tearing down are discarded,
            // not applied.
            if self.shutdown.load(Ordering::SeqCst) {
                debug!("Shutdown requested; discarding remaining poll results");
                queries.abort_all();
                break;
            }
            let (id, tx_hash, pair, status) = match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "Status query task failed");
                    sweep.errors += 1;
                    continue;
                }
            };
            match status {
                Ok(TxStatus::Confirmed(fill)) => {
                    sweep.polled += 1;
                    if self.fill_order(&id, &tx_hash, &pair, fill, now).await {
                        sweep.filled += 1;
                    }
                }
                Ok(TxStatus::Failed) => {
                    sweep.polled += 1;
                    if self.fail_order(&id, "transaction reverted", now).await {
                        sweep.failed += 1;
                    }
                }
                // Venue indexing lag is expected; an absent record is not
                // a rejection.
                Ok(TxStatus::Pending) | Ok(TxStatus::Unknown) => {
                    sweep.polled += 1;
                    self.store.touch(&id, now).await;
                }
                Err(e) => {
                    warn!(
                        client_order_id = %id,
                        tx_hash = %tx_hash,
                        error = %e,
                        "Status poll failed; retrying next tick"
                    );
                    sweep.errors += 1;
                }
            }
        }

        sweep
    }

    /// Apply a confirmed fill. Returns true when the transition happened
    /// this call (and the event fired).
    async fn fill_order(
        &self,
        id: &ClientOrderId,
        tx_hash: &str,
        pair: &str,
        fill: FillDetails,
        now: DateTime<Utc>,
    ) -> bool {
        let fill = self.quantize_fill(pair, fill);
        let Some(order) = self.store.apply_fill(id, &fill, now).await else {
            debug!(
                client_order_id = %id,
                tx_hash = %tx_hash,
                "Duplicate confirmation discarded"
            );
            return false;
        };
        self.bus.publish_order_filled(OrderFilledEvent {
            client_order_id: order.client_order_id.clone(),
            exchange_trade_id: tx_hash.to_string(),
            executed_amount: fill.executed_amount,
            executed_price: fill.executed_price,
            fee_asset: fill.fee_asset.or(order.fee_asset),
            fee_amount: fill.fee,
            timestamp: now,
        });
        true
    }

    /// Apply a failure. Returns true when the transition happened this call.
    async fn fail_order(&self, id: &ClientOrderId, reason: &str, now: DateTime<Utc>) -> bool {
        let Some(order) = self.store.apply_failure(id, now).await else {
            debug!(client_order_id = %id, "Duplicate failure discarded");
            return false;
        };
        self.bus.publish_order_failed(OrderFailedEvent {
            client_order_id: order.client_order_id,
            reason: reason.to_string(),
            timestamp: now,
        });
        true
    }

    /// Snap venue-reported quantities to asset increments on ingestion.
    fn quantize_fill(&self, pair: &str, fill: FillDetails) -> FillDetails {
        let Some(pair) = TradingPair::parse(pair) else {
            return fill;
        };
        let fee = match &fill.fee_asset {
            Some(asset) => quantize_asset(&self.quantums, asset, fill.fee),
            None => fill.fee,
        };
        FillDetails {
            executed_amount: quantize_asset(&self.quantums, &pair.base, fill.executed_amount),
            executed_price: quantize_asset(&self.quantums, &pair.quote, fill.executed_price),
            fee,
            fee_asset: fill.fee_asset,
        }
    }
}
