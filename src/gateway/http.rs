//! HTTP gateway client.
//!
//! Thin reqwest-based implementation of [`GatewayApi`] against a gateway
//! service base URL. Requests are JSON in both directions and rate-limited
//! client-side. Authentication, transport retries and base-URL discovery are
//! the host's concern.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use super::{ChainInfo, FillDetails, GatewayApi, GatewayError, TxStatus};
use crate::types::OrderSide;

type DirectRateLimiter =
    RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>;

/// Requests per second issued to the gateway service.
const RATE_LIMIT: u32 = 10;

/// JSON client for the gateway service.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<DirectRateLimiter>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalancesResponse {
    balances: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceResponse {
    price: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeResponse {
    tx_hash: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollResponse {
    tx_status: String,
    executed_amount: Option<String>,
    executed_price: Option<String>,
    fee: Option<String>,
    fee_asset: Option<String>,
}

impl HttpGateway {
    /// Create a client for the gateway at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, GatewayError> {
        let base_url: String = base_url.into();
        if base_url.is_empty() {
            return Err(GatewayError::Configuration(
                "gateway base URL must not be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        // SAFETY: RATE_LIMIT is a non-zero constant, this will never fail
        let quota =
            Quota::per_second(NonZeroU32::new(RATE_LIMIT).expect("RATE_LIMIT is non-zero constant"));
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter,
        })
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, GatewayError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "gateway request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Venue {
                code: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))
    }

    fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, GatewayError> {
        Decimal::from_str(raw)
            .map_err(|_| GatewayError::Malformed(format!("{field}: not a decimal: {raw}")))
    }
}

#[async_trait]
impl GatewayApi for HttpGateway {
    async fn get_balances(
        &self,
        address: &str,
    ) -> Result<HashMap<String, Decimal>, GatewayError> {
        let response: BalancesResponse = self
            .post_json(
                "/network/balances",
                serde_json::json!({ "address": address }),
            )
            .await?;

        let mut balances = HashMap::with_capacity(response.balances.len());
        for (asset, raw) in response.balances {
            let amount = Self::parse_decimal(&raw, "balance")?;
            balances.insert(asset, amount);
        }
        Ok(balances)
    }

    async fn get_price(
        &self,
        trading_pair: &str,
        side: OrderSide,
        amount: Decimal,
    ) -> Result<Decimal, GatewayError> {
        let response: PriceResponse = self
            .post_json(
                "/amm/price",
                serde_json::json!({
                    "pair": trading_pair,
                    "side": side.to_string(),
                    "amount": amount.to_string(),
                }),
            )
            .await?;
        Self::parse_decimal(&response.price, "price")
    }

    async fn submit_order(
        &self,
        trading_pair: &str,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
        gas_price: Decimal,
    ) -> Result<String, GatewayError> {
        let response: TradeResponse = self
            .post_json(
                "/amm/trade",
                serde_json::json!({
                    "pair": trading_pair,
                    "side": side.to_string(),
                    "amount": amount.to_string(),
                    "limitPrice": price.to_string(),
                    "gasPrice": gas_price.to_string(),
                }),
            )
            .await?;
        Ok(response.tx_hash)
    }

    async fn get_transaction_status(&self, tx_hash: &str) -> Result<TxStatus, GatewayError> {
        let response: Result<PollResponse, GatewayError> = self
            .post_json("/network/poll", serde_json::json!({ "txHash": tx_hash }))
            .await;

        let response = match response {
            Ok(r) => r,
            // A hash the venue has not indexed yet is not an error.
            Err(GatewayError::Venue { code: 404, .. }) => return Ok(TxStatus::Unknown),
            Err(e) => return Err(e),
        };

        match response.tx_status.as_str() {
            "PENDING" => Ok(TxStatus::Pending),
            "FAILED" => Ok(TxStatus::Failed),
            "UNKNOWN" => Ok(TxStatus::Unknown),
            "CONFIRMED" => {
                let executed_amount = response.executed_amount.ok_or_else(|| {
                    GatewayError::Malformed("confirmed poll without executedAmount".to_string())
                })?;
                let executed_price = response.executed_price.ok_or_else(|| {
                    GatewayError::Malformed("confirmed poll without executedPrice".to_string())
                })?;
                let fee = match response.fee {
                    Some(raw) => Self::parse_decimal(&raw, "fee")?,
                    None => Decimal::ZERO,
                };
                Ok(TxStatus::Confirmed(FillDetails {
                    executed_amount: Self::parse_decimal(&executed_amount, "executedAmount")?,
                    executed_price: Self::parse_decimal(&executed_price, "executedPrice")?,
                    fee,
                    fee_asset: response.fee_asset,
                }))
            }
            other => Err(GatewayError::Malformed(format!(
                "unrecognized txStatus: {other}"
            ))),
        }
    }

    async fn get_chain_info(&self) -> Result<ChainInfo, GatewayError> {
        let values: HashMap<String, String> = self
            .post_json("/network/config", serde_json::json!({}))
            .await?;
        Ok(ChainInfo::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_empty_base_url() {
        assert!(matches!(
            HttpGateway::new(""),
            Err(GatewayError::Configuration(_))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let gateway = HttpGateway::new("https://localhost:15888/").unwrap();
        assert_eq!(gateway.base_url, "https://localhost:15888");
    }

    #[test]
    fn test_parse_decimal_rejects_garbage() {
        assert!(HttpGateway::parse_decimal("abc", "price").is_err());
        assert_eq!(
            HttpGateway::parse_decimal("0.002684496", "price").unwrap(),
            Decimal::from_str("0.002684496").unwrap()
        );
    }
}
