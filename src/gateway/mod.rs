//! Gateway Abstraction Layer
//!
//! The engine never talks to the chain directly; every venue interaction
//! goes through an intermediary gateway service exposed here as an
//! async trait. Implementations own no engine state and may fail on any
//! call; the reconciliation passes treat every method as a long-latency
//! network operation.

pub mod http;

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::OrderSide;

pub use http::HttpGateway;

/// Errors surfaced by gateway operations.
///
/// All variants are transient from the engine's point of view: the prior
/// local state is retained and the call is retried on a later tick.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Transport-level failure (timeout, connection refused, 5xx)
    #[error("gateway network error: {0}")]
    Network(String),

    /// The gateway answered with a venue-level rejection
    #[error("venue error {code}: {message}")]
    Venue { code: u16, message: String },

    /// Response body did not match the expected shape
    #[error("malformed gateway response: {0}")]
    Malformed(String),

    /// Client-side misconfiguration (bad base URL, missing address)
    #[error("gateway configuration error: {0}")]
    Configuration(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

/// Fill details reported for a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillDetails {
    /// Base-asset amount actually swapped
    pub executed_amount: Decimal,
    /// Effective execution price
    pub executed_price: Decimal,
    /// Fee paid, denominated in `fee_asset`
    pub fee: Decimal,
    /// Fee asset if the gateway reports one (native currency otherwise)
    pub fee_asset: Option<String>,
}

/// Status of a submitted transaction as reported by the gateway.
///
/// `Unknown` means the venue has no record of the hash yet. Indexing lag is
/// expected on chain, so `Unknown` is never a rejection.
#[derive(Debug, Clone, PartialEq)]
pub enum TxStatus {
    /// Still in flight
    Pending,
    /// Mined and successful, with fill details
    Confirmed(FillDetails),
    /// Reverted or rejected by the venue
    Failed,
    /// No record of the transaction (yet)
    Unknown,
}

/// Chain-level metadata, fetched once and cached by the connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainInfo {
    values: HashMap<String, String>,
}

impl ChainInfo {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Symbol fees are denominated in (e.g., "ETH").
    pub fn native_currency(&self) -> Option<&str> {
        self.get("nativeCurrency")
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Core trait for gateway access - venue implementations must provide this.
///
/// Implementations are stateless per call and safe to share behind an `Arc`.
#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Fetch all token balances for a wallet address.
    async fn get_balances(&self, address: &str)
        -> Result<HashMap<String, Decimal>, GatewayError>;

    /// Get an indicative price for swapping `amount` of the pair's base asset.
    async fn get_price(
        &self,
        trading_pair: &str,
        side: OrderSide,
        amount: Decimal,
    ) -> Result<Decimal, GatewayError>;

    /// Submit a swap. Returns the transaction hash on acceptance.
    async fn submit_order(
        &self,
        trading_pair: &str,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
        gas_price: Decimal,
    ) -> Result<String, GatewayError>;

    /// Poll the status of a previously submitted transaction.
    async fn get_transaction_status(&self, tx_hash: &str) -> Result<TxStatus, GatewayError>;

    /// Fetch chain metadata (native currency symbol, decimals, ...).
    async fn get_chain_info(&self) -> Result<ChainInfo, GatewayError>;
}
