//! Common Types Module
//!
//! Shared types used across the codebase to avoid circular dependencies.

use serde::{Deserialize, Serialize};

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Order type accepted by the gateway.
///
/// AMM swaps execute against pool liquidity, so a `Limit` order here is a
/// swap with a worst-acceptable price rather than a resting book order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Limit => write!(f, "limit"),
            OrderType::Market => write!(f, "market"),
        }
    }
}

/// A trading pair split into base and quote assets.
///
/// Pairs arrive as hyphenated symbols (e.g., "DAI-WETH"). Parsing never
/// panics; malformed input is reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    /// Parse a hyphenated pair symbol.
    pub fn parse(symbol: &str) -> Option<Self> {
        let (base, quote) = symbol.split_once('-')?;
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        Some(Self {
            base: base.to_string(),
            quote: quote.to_string(),
        })
    }
}

impl std::fmt::Display for TradingPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_display() {
        assert_eq!(OrderSide::Buy.to_string(), "buy");
        assert_eq!(OrderSide::Sell.to_string(), "sell");
    }

    #[test]
    fn test_pair_parse() {
        let pair = TradingPair::parse("DAI-WETH").unwrap();
        assert_eq!(pair.base, "DAI");
        assert_eq!(pair.quote, "WETH");
        assert_eq!(pair.to_string(), "DAI-WETH");

        assert!(TradingPair::parse("DAIWETH").is_none());
        assert!(TradingPair::parse("-WETH").is_none());
        assert!(TradingPair::parse("DAI-").is_none());
    }
}
