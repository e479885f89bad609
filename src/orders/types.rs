//! Core types for order tracking.
//!
//! Provides type-safe order identifiers and the in-flight order record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{OrderSide, OrderType};

/// Type-safe, locally generated order identifier.
///
/// Assigned at submission time, before any venue interaction succeeds, and
/// never reused for the lifetime of the engine. Venue-assigned transaction
/// hashes are tracked separately on [`InFlightOrder`].
///
/// # Thread Safety
///
/// `ClientOrderId` is `Clone`, `Send`, and `Sync`, making it safe for use
/// across async boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Create a new ClientOrderId from any string-like type.
    ///
    /// # Panics
    ///
    /// Debug builds will panic if the ID is empty. Release builds log a warning.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let s: String = id.into();
        debug_assert!(!s.is_empty(), "ClientOrderId cannot be empty");
        if s.is_empty() {
            tracing::warn!("Creating ClientOrderId with empty string - this may cause tracking issues");
        }
        Self(s)
    }

    /// Get the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner String.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientOrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClientOrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ClientOrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Order lifecycle states.
///
/// Transitions are monotonic: `PendingCreate -> Created -> terminal`. The
/// only permitted skips are `PendingCreate -> Failed` (submission rejected
/// or presumed lost) and `PendingCreate -> Cancelled` (cancelled before
/// anything reached the chain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Submitted locally, no transaction hash yet
    PendingCreate,
    /// Accepted by the venue, transaction in flight
    Created,
    /// Confirmed on chain
    Filled,
    /// Reverted, rejected, or submission lost
    Failed,
    /// Cancelled locally before reaching the chain
    Cancelled,
}

impl OrderState {
    /// Returns true if no further transitions are permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Failed | Self::Cancelled)
    }

    /// Position in the monotonic ordering; transitions never decrease it.
    pub fn rank(&self) -> u8 {
        match self {
            Self::PendingCreate => 0,
            Self::Created => 1,
            Self::Filled | Self::Failed | Self::Cancelled => 2,
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PendingCreate => write!(f, "PendingCreate"),
            Self::Created => write!(f, "Created"),
            Self::Filled => write!(f, "Filled"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Complete in-flight order record.
///
/// Owned exclusively by the order store; everything handed out is a clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InFlightOrder {
    /// Locally generated identifier
    pub client_order_id: ClientOrderId,
    /// Venue-assigned transaction hash; absent until submission succeeds,
    /// immutable once set
    pub exchange_order_id: Option<String>,
    /// Trading pair (e.g., "DAI-WETH")
    pub trading_pair: String,
    /// Buy or sell
    pub side: OrderSide,
    /// Limit or market
    pub order_type: OrderType,
    /// Requested price
    pub price: Decimal,
    /// Requested base-asset amount
    pub amount: Decimal,
    /// Gas price offered at submission
    pub gas_price: Decimal,
    /// Asset venue fees are denominated in (native currency)
    pub fee_asset: Option<String>,
    /// Current lifecycle state
    pub state: OrderState,
    /// Base-asset amount confirmed executed
    pub executed_amount: Decimal,
    /// Effective execution price once filled
    pub executed_price: Option<Decimal>,
    /// Fee paid once filled
    pub fee_paid: Decimal,
    /// Engine-clock time at creation
    pub created_at: DateTime<Utc>,
    /// Last time a reconciliation pass touched this order
    pub updated_at: DateTime<Utc>,
}

impl InFlightOrder {
    /// Create a new order record in `PendingCreate` state.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_order_id: ClientOrderId,
        trading_pair: String,
        side: OrderSide,
        order_type: OrderType,
        price: Decimal,
        amount: Decimal,
        gas_price: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            client_order_id,
            exchange_order_id: None,
            trading_pair,
            side,
            order_type,
            price,
            amount,
            gas_price,
            fee_asset: None,
            state: OrderState::PendingCreate,
            executed_amount: Decimal::ZERO,
            executed_price: None,
            fee_paid: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
