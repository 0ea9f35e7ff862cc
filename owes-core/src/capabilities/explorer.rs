//! EtherScan-compatible chain explorer adapter.
//!
//! Uses the v2 multi-chain API: every call carries a `chainid` parameter,
//! so one adapter instance serves all configured networks. Empty result
//! sets come back with status "0" and a "No transactions found" message;
//! those are data, not errors.

use super::{ChainExplorer, ExplorerError, InboundKind, InboundTx};
use crate::entities::ChainTag;
use crate::utils::amounts::FeeEstimate;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use std::str::FromStr;
use tracing::debug;

/// Explorer adapter over the EtherScan v2 API.
pub struct EtherScanExplorer {
    http: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct EtherScanResponse<T> {
    status: String,
    message: String,
    result: T,
}

#[derive(Debug, Deserialize)]
struct TxListItem {
    from: String,
    #[serde(default, rename = "isError")]
    is_error: String,
}

#[derive(Debug, Deserialize)]
struct GasOracleResult {
    #[serde(rename = "SafeGasPrice")]
    safe_gas_price: String,
    #[serde(rename = "FastGasPrice")]
    fast_gas_price: String,
}

impl EtherScanExplorer {
    const API_URL: &str = "https://api.etherscan.io/v2/api";

    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            api_key,
        }
    }

    /// Fetch the first transaction into `address` from a transaction-list
    /// action (`txlist` or `txlistinternal`). `None` when the list is empty.
    async fn first_inbound(
        &self,
        address: &str,
        chain: ChainTag,
        action: &str,
    ) -> Result<Option<String>, ExplorerError> {
        let chain_id = chain.chain_id().to_string();
        let response = self
            .http
            .get(Self::API_URL)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("chainid", chain_id.as_str()),
                ("module", "account"),
                ("action", action),
                ("address", address),
                ("startblock", "0"),
                ("endblock", "latest"),
                ("page", "1"),
                ("offset", "10"),
                ("sort", "asc"),
            ])
            .send()
            .await?;
        let response: EtherScanResponse<Vec<TxListItem>> = response.json().await?;

        if response.status != "1" {
            if response.result.is_empty() {
                return Ok(None);
            }
            return Err(ExplorerError::Api {
                message: response.message,
            });
        }

        let sender = response
            .result
            .into_iter()
            .find(|tx| tx.is_error != "1" && !tx.from.is_empty())
            .map(|tx| tx.from);
        Ok(sender)
    }
}

/// Parse a gwei decimal string into wei.
fn gwei_to_wei(raw: &str) -> Result<u128, ExplorerError> {
    let gwei = Decimal::from_str(raw)
        .map_err(|e| ExplorerError::Parse(format!("invalid gas price {raw:?}: {e}")))?;
    gwei.checked_mul(Decimal::from(1_000_000_000u64))
        .and_then(|wei| wei.trunc().to_u128())
        .ok_or_else(|| ExplorerError::Parse(format!("gas price out of range: {raw:?}")))
}

#[async_trait]
impl ChainExplorer for EtherScanExplorer {
    async fn native_balance(&self, address: &str, chain: ChainTag) -> Result<u128, ExplorerError> {
        let chain_id = chain.chain_id().to_string();
        let response = self
            .http
            .get(Self::API_URL)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("chainid", chain_id.as_str()),
                ("module", "account"),
                ("action", "balance"),
                ("address", address),
                ("tag", "latest"),
            ])
            .send()
            .await?;
        let response: EtherScanResponse<String> = response.json().await?;

        if response.status != "1" {
            return Err(ExplorerError::Api {
                message: response.message,
            });
        }
        let balance = response
            .result
            .parse::<u128>()
            .map_err(|e| ExplorerError::Parse(format!("invalid balance: {e}")))?;
        debug!(address, %chain, balance, "Fetched native balance");
        Ok(balance)
    }

    async fn latest_inbound(
        &self,
        address: &str,
        chain: ChainTag,
    ) -> Result<Option<InboundTx>, ExplorerError> {
        if let Some(sender) = self.first_inbound(address, chain, "txlist").await? {
            return Ok(Some(InboundTx {
                sender,
                kind: InboundKind::Normal,
            }));
        }
        // No normal transfer; the deposit may have come from a contract.
        if let Some(sender) = self.first_inbound(address, chain, "txlistinternal").await? {
            return Ok(Some(InboundTx {
                sender,
                kind: InboundKind::Internal,
            }));
        }
        Ok(None)
    }

    async fn fee_estimate(&self, chain: ChainTag) -> Result<FeeEstimate, ExplorerError> {
        let chain_id = chain.chain_id().to_string();
        let response = self
            .http
            .get(Self::API_URL)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("chainid", chain_id.as_str()),
                ("module", "gastracker"),
                ("action", "gasoracle"),
            ])
            .send()
            .await?;
        let response: EtherScanResponse<GasOracleResult> = response.json().await?;

        if response.status != "1" {
            return Err(ExplorerError::Api {
                message: response.message,
            });
        }
        Ok(FeeEstimate {
            max_fee_per_gas: gwei_to_wei(&response.result.fast_gas_price)?,
            max_priority_fee_per_gas: gwei_to_wei(&response.result.safe_gas_price)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gwei_strings_convert_to_wei() {
        assert_eq!(gwei_to_wei("1").unwrap(), 1_000_000_000);
        assert_eq!(gwei_to_wei("0.5").unwrap(), 500_000_000);
        assert_eq!(gwei_to_wei("12.75").unwrap(), 12_750_000_000);
        assert!(gwei_to_wei("n/a").is_err());
    }
}
