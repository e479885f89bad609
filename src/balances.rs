//! Account balance reconciliation.
//!
//! Keeps a local snapshot of gateway-reported balances, refreshed on a
//! caller-controlled cadence. The snapshot is replaced wholesale on each
//! successful poll and left untouched on failure: stale-but-consistent
//! beats partially-updated.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::gateway::{GatewayApi, GatewayError};
use crate::quant::{quantize_asset, QuantumMap};

/// What one `refresh` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Snapshot replaced from a fresh gateway query
    Refreshed,
    /// Last successful refresh is recent enough; nothing was queried
    Debounced,
}

/// Periodically refreshes the local balance view from the gateway.
pub struct BalanceReconciler<G> {
    gateway: Arc<G>,
    address: String,
    quantums: Arc<QuantumMap>,
    min_interval: Duration,
    snapshot: RwLock<HashMap<String, Decimal>>,
    last_success: RwLock<Option<DateTime<Utc>>>,
}

impl<G: GatewayApi> BalanceReconciler<G> {
    pub fn new(
        gateway: Arc<G>,
        address: String,
        quantums: Arc<QuantumMap>,
        min_interval: Duration,
    ) -> Self {
        Self {
            gateway,
            address,
            quantums,
            min_interval,
            snapshot: RwLock::new(HashMap::new()),
            last_success: RwLock::new(None),
        }
    }

    /// Refresh the snapshot from the gateway.
    ///
    /// Non-forced calls within `min_interval` of the last success are
    /// debounced no-ops. A failed query leaves the prior snapshot in place
    /// and surfaces the error to the caller; the next tick retries.
    pub async fn refresh(
        &self,
        now: DateTime<Utc>,
        force: bool,
    ) -> Result<RefreshOutcome, GatewayError> {
        if !force {
            let last = *self.last_success.read().await;
            if let Some(last) = last {
                if now - last < self.min_interval {
                    debug!("Balance refresh debounced");
                    return Ok(RefreshOutcome::Debounced);
                }
            }
        }

        let raw = match self.gateway.get_balances(&self.address).await {
            Ok(balances) => balances,
            Err(e) => {
                warn!(error = %e, "Balance poll failed; keeping prior snapshot");
                return Err(e);
            }
        };

        let fresh: HashMap<String, Decimal> = raw
            .into_iter()
            .map(|(asset, amount)| {
                let quantized = quantize_asset(&self.quantums, &asset, amount);
                (asset, quantized)
            })
            .collect();

        let count = fresh.len();
        {
            let mut snapshot = self.snapshot.write().await;
            *snapshot = fresh;
        }
        *self.last_success.write().await = Some(now);

        info!(assets = count, "Balance snapshot refreshed");
        Ok(RefreshOutcome::Refreshed)
    }

    /// Balance for one asset. Absence is "not yet observed," not an error.
    pub async fn get_balance(&self, asset: &str) -> Decimal {
        let snapshot = self.snapshot.read().await;
        snapshot.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// Clone of the whole snapshot.
    pub async fn all_balances(&self) -> HashMap<String, Decimal> {
        let snapshot = self.snapshot.read().await;
        snapshot.clone()
    }

    /// True once at least one refresh has succeeded.
    pub async fn has_refreshed(&self) -> bool {
        self.last_success.read().await.is_some()
    }
}
