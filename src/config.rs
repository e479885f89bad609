//! Connector configuration.

use chrono::Duration;
use rust_decimal::Decimal;

use crate::quant::QuantumMap;

/// Configuration for the gateway AMM connector.
///
/// Plain values only; loading these from files or flags is the host's
/// concern.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Wallet address balances and submissions are scoped to
    pub address: String,
    /// Pairs this connector is responsible for; orders referencing
    /// anything else are skipped with a warning
    pub trading_pairs: Vec<String>,
    /// Minimal increments per asset, supplied externally
    pub quantums: QuantumMap,
    /// Minimum interval between non-forced balance refreshes
    pub balance_refresh_interval: Duration,
    /// How long an order may sit without a transaction hash before its
    /// submission is presumed lost
    pub submission_timeout: Duration,
    /// How long terminal orders are retained for duplicate suppression
    pub terminal_retention: Duration,
    /// Upper bound on concurrent status polls per pass
    pub poll_concurrency: usize,
    /// Gas price attached to submissions
    pub gas_price: Decimal,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            trading_pairs: Vec::new(),
            quantums: QuantumMap::new(),
            balance_refresh_interval: Duration::seconds(30),
            submission_timeout: Duration::seconds(120),
            terminal_retention: Duration::seconds(600),
            poll_concurrency: 8,
            gas_price: Decimal::ZERO,
        }
    }
}
