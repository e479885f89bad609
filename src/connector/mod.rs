//! Gateway AMM connector engine.
//!
//! Ties the order store, balance reconciler, status reconciler and event
//! bus together behind a single entry point. The engine is passive: an
//! external tick driver calls `on_tick` at roughly one-second cadence and
//! everything else is request/response. The gateway handle is injected at
//! construction; there are no process-wide singletons.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::balances::{BalanceReconciler, RefreshOutcome};
use crate::config::ConnectorConfig;
use crate::events::{EventBus, OrderCancelledEvent, OrderCreatedEvent, OrderFailedEvent};
use crate::gateway::{ChainInfo, GatewayApi, GatewayError};
use crate::orders::{
    ClientOrderId, InFlightOrder, OrderStore, OrderTrackingError, StatusReconciler, StatusSweep,
};
use crate::quant::{quantize_asset, QuantumMap};
use crate::types::{OrderSide, OrderType, TradingPair};

/// What one tick accomplished.
///
/// Handed back to the host loop so it can alert on repeated failures
/// without parsing logs. Errors inside are already-logged, non-fatal
/// outcomes; the next tick retries.
#[derive(Debug)]
pub struct TickSummary {
    pub balance: Result<RefreshOutcome, GatewayError>,
    pub sweep: StatusSweep,
    pub evicted: usize,
}

/// Order-lifecycle engine for an AMM venue behind a polling gateway.
pub struct AmmConnector<G> {
    gateway: Arc<G>,
    config: ConnectorConfig,
    store: OrderStore,
    bus: Arc<EventBus>,
    balances: BalanceReconciler<G>,
    status: StatusReconciler<G>,
    quantums: Arc<QuantumMap>,
    known_pairs: HashSet<String>,
    chain_info: RwLock<Option<ChainInfo>>,
    current_time: RwLock<DateTime<Utc>>,
    nonce: AtomicU64,
    shutdown: Arc<AtomicBool>,
}

impl<G: GatewayApi + 'static> AmmConnector<G> {
    pub fn new(gateway: Arc<G>, config: ConnectorConfig) -> Self {
        let store = OrderStore::new();
        let bus = Arc::new(EventBus::new());
        let quantums = Arc::new(config.quantums.clone());
        let known_pairs: HashSet<String> = config.trading_pairs.iter().cloned().collect();
        let shutdown = Arc::new(AtomicBool::new(false));

        let balances = BalanceReconciler::new(
            Arc::clone(&gateway),
            config.address.clone(),
            Arc::clone(&quantums),
            config.balance_refresh_interval,
        );
        let status = StatusReconciler::new(
            Arc::clone(&gateway),
            store.clone(),
            Arc::clone(&bus),
            Arc::clone(&quantums),
            known_pairs.clone(),
            config.submission_timeout,
            config.poll_concurrency,
            Arc::clone(&shutdown),
        );

        Self {
            gateway,
            config,
            store,
            bus,
            balances,
            status,
            quantums,
            known_pairs,
            chain_info: RwLock::new(None),
            // Construction is a real-world event; every later timestamp
            // comes from the tick driver.
            current_time: RwLock::new(Utc::now()),
            nonce: AtomicU64::new(1),
            shutdown,
        }
    }

    /// Submit a buy order. Returns the locally generated order id; venue
    /// acceptance or rejection arrives as an `OrderCreated`/`OrderFailed`
    /// event.
    pub async fn buy(
        &self,
        trading_pair: &str,
        amount: Decimal,
        order_type: OrderType,
        price: Decimal,
    ) -> Result<ClientOrderId, OrderTrackingError> {
        self.submit(trading_pair, OrderSide::Buy, amount, order_type, price)
            .await
    }

    /// Submit a sell order. Same contract as [`buy`](Self::buy).
    pub async fn sell(
        &self,
        trading_pair: &str,
        amount: Decimal,
        order_type: OrderType,
        price: Decimal,
    ) -> Result<ClientOrderId, OrderTrackingError> {
        self.submit(trading_pair, OrderSide::Sell, amount, order_type, price)
            .await
    }

    async fn submit(
        &self,
        trading_pair: &str,
        side: OrderSide,
        amount: Decimal,
        order_type: OrderType,
        price: Decimal,
    ) -> Result<ClientOrderId, OrderTrackingError> {
        let Some(pair) = TradingPair::parse(trading_pair) else {
            return Err(OrderTrackingError::UnsupportedPair(trading_pair.to_string()));
        };
        if !self.known_pairs.contains(trading_pair) {
            return Err(OrderTrackingError::UnsupportedPair(trading_pair.to_string()));
        }

        let now = *self.current_time.read().await;
        let amount = quantize_asset(&self.quantums, &pair.base, amount);
        let price = quantize_asset(&self.quantums, &pair.quote, price);
        let client_order_id = self.next_order_id(side, trading_pair);

        let mut order = InFlightOrder::new(
            client_order_id.clone(),
            trading_pair.to_string(),
            side,
            order_type,
            price,
            amount,
            self.config.gas_price,
            now,
        );
        order.fee_asset = self.native_currency().await;

        // Record before any venue I/O so a lost submission still has a
        // record to time out against.
        self.store.start_tracking(order).await?;
        info!(
            client_order_id = %client_order_id,
            trading_pair = %trading_pair,
            side = %side,
            amount = %amount,
            price = %price,
            "Order submitted"
        );

        let result = self
            .gateway
            .submit_order(trading_pair, side, amount, price, self.config.gas_price)
            .await;

        if self.shutdown.load(Ordering::SeqCst) {
            return Ok(client_order_id);
        }

        match result {
            Ok(tx_hash) => {
                self.store
                    .set_exchange_order_id(&client_order_id, &tx_hash)
                    .await;
                if self.store.mark_created(&client_order_id, now).await.is_some() {
                    self.bus.publish_order_created(OrderCreatedEvent {
                        client_order_id: client_order_id.clone(),
                        exchange_order_id: tx_hash,
                        trading_pair: trading_pair.to_string(),
                        side,
                        amount,
                        price,
                        timestamp: now,
                    });
                }
            }
            Err(e) => {
                warn!(
                    client_order_id = %client_order_id,
                    error = %e,
                    "Order submission failed"
                );
                if self.store.apply_failure(&client_order_id, now).await.is_some() {
                    self.bus.publish_order_failed(OrderFailedEvent {
                        client_order_id: client_order_id.clone(),
                        reason: e.to_string(),
                        timestamp: now,
                    });
                }
            }
        }

        Ok(client_order_id)
    }

    /// Cancel an order locally.
    ///
    /// Only orders that never obtained a transaction hash can be
    /// cancelled; a swap already on chain settles on its own and keeps
    /// polling. Returns true when the cancellation happened this call.
    pub async fn cancel(&self, client_order_id: &ClientOrderId) -> bool {
        let now = *self.current_time.read().await;
        match self.store.get(client_order_id).await {
            None => {
                warn!(client_order_id = %client_order_id, "Cancel for unknown order");
                false
            }
            Some(order) if order.is_terminal() => false,
            Some(order) if order.exchange_order_id.is_some() => {
                warn!(
                    client_order_id = %client_order_id,
                    "Cancel refused: transaction already on chain"
                );
                false
            }
            Some(_) => {
                if self.store.apply_cancel(client_order_id, now).await.is_some() {
                    self.bus.publish_order_cancelled(OrderCancelledEvent {
                        client_order_id: client_order_id.clone(),
                        timestamp: now,
                    });
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Indicative price for swapping `amount` of the pair's base asset.
    ///
    /// Buy and sell are independent venue calls; the venue may legitimately
    /// quote them asymmetrically, so nothing is cached across sides.
    pub async fn get_quote_price(
        &self,
        trading_pair: &str,
        side: OrderSide,
        amount: Decimal,
    ) -> Result<Decimal, GatewayError> {
        let price = self.gateway.get_price(trading_pair, side, amount).await?;
        Ok(match TradingPair::parse(trading_pair) {
            Some(pair) => quantize_asset(&self.quantums, &pair.quote, price),
            None => price,
        })
    }

    /// Price to use when composing an order. Same as the quote price for
    /// an AMM venue.
    pub async fn get_order_price(
        &self,
        trading_pair: &str,
        side: OrderSide,
        amount: Decimal,
    ) -> Result<Decimal, GatewayError> {
        self.get_quote_price(trading_pair, side, amount).await
    }

    /// Chain metadata, fetched once and cached.
    pub async fn chain_info(&self) -> Result<ChainInfo, GatewayError> {
        if let Some(info) = self.chain_info.read().await.clone() {
            return Ok(info);
        }
        let info = self.gateway.get_chain_info().await?;
        info!(
            native_currency = info.native_currency().unwrap_or("?"),
            "Chain info cached"
        );
        *self.chain_info.write().await = Some(info.clone());
        Ok(info)
    }

    /// Drop the cached chain metadata; the next call refetches.
    pub async fn invalidate_chain_info(&self) {
        *self.chain_info.write().await = None;
    }

    /// Native currency symbol from the cached chain info, if fetched.
    pub async fn native_currency(&self) -> Option<String> {
        self.chain_info
            .read()
            .await
            .as_ref()
            .and_then(|info| info.native_currency().map(String::from))
    }

    /// One reconciliation pass; the tick driver's entry point.
    ///
    /// Safe at any cadence: extra ticks only hit the balance debounce.
    /// Balance and order reconciliation run concurrently; they touch
    /// disjoint state.
    pub async fn on_tick(&self, now: DateTime<Utc>) -> TickSummary {
        *self.current_time.write().await = now;

        if self.shutdown.load(Ordering::SeqCst) {
            return TickSummary {
                balance: Ok(RefreshOutcome::Debounced),
                sweep: StatusSweep::default(),
                evicted: 0,
            };
        }

        if self.chain_info.read().await.is_none() {
            if let Err(e) = self.chain_info().await {
                warn!(error = %e, "Chain info fetch failed; retrying next tick");
            }
        }

        let (balance, sweep) = tokio::join!(
            self.balances.refresh(now, false),
            self.status.reconcile(now)
        );
        let evicted = self
            .store
            .evict_expired(now, self.config.terminal_retention)
            .await;

        TickSummary {
            balance,
            sweep,
            evicted,
        }
    }

    /// Force or request a balance refresh outside the tick cadence.
    pub async fn update_balances(&self, force: bool) -> Result<RefreshOutcome, GatewayError> {
        let now = *self.current_time.read().await;
        self.balances.refresh(now, force).await
    }

    /// Stop applying results. In-flight gateway calls are abandoned and
    /// anything they return later is discarded.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        info!("Connector shutdown requested");
    }

    /// Ready once chain metadata is cached and balances have been
    /// observed at least once.
    pub async fn ready(&self) -> bool {
        self.chain_info.read().await.is_some() && self.balances.has_refreshed().await
    }

    pub async fn get_balance(&self, asset: &str) -> Decimal {
        self.balances.get_balance(asset).await
    }

    pub async fn all_balances(&self) -> std::collections::HashMap<String, Decimal> {
        self.balances.all_balances().await
    }

    pub async fn order_count(&self) -> usize {
        self.store.len().await
    }

    pub async fn active_order_count(&self) -> usize {
        self.store.active_count().await
    }

    pub async fn in_flight_order(&self, id: &ClientOrderId) -> Option<InFlightOrder> {
        self.store.get(id).await
    }

    /// The lifecycle event bus; subscribe before submitting orders.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    fn next_order_id(&self, side: OrderSide, trading_pair: &str) -> ClientOrderId {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        ClientOrderId::new(format!("{side}-{trading_pair}-{nonce}"))
    }
}
