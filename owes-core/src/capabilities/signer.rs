//! MPC signing sidecar adapter.
//!
//! One HTTP client for everything that goes through the chain-signature
//! service: address derivation, native transfers, escrow contract calls
//! and the archive write. The service holds the key shares; this process
//! never sees a private key.
//!
//! Broadcasts are retried once after a short delay before the failure is
//! reported, since a dropped broadcast is usually a transient RPC hiccup.

use super::{
    ArchiveError, BetArchive, BetRegistry, ChainWallet, CreateBetRequest, CreatedBet,
    RegistryError, ResolveBetRequest, SendRequest, TxReceipt, WalletError,
};
use crate::entities::ChainTag;
use crate::entities::bet::BetRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Delay before the single broadcast retry.
const BROADCAST_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Adapter over the MPC signing sidecar's HTTP API.
pub struct MpcSigner {
    http: reqwest::Client,
    base: Url,
    /// Account owning the shared key; all derivation paths are relative
    /// to it.
    signer_account: String,
}

#[derive(Debug, Serialize)]
struct DeriveRequest<'a> {
    account_id: &'a str,
    path: &'a str,
    chain: ChainTag,
}

#[derive(Debug, Deserialize)]
struct DeriveResponse {
    address: String,
}

#[derive(Debug, Serialize)]
struct SendWire<'a> {
    account_id: &'a str,
    path: &'a str,
    from: &'a str,
    to: &'a str,
    /// Wei, as a decimal string.
    value: String,
    gas_limit: u64,
    chain: ChainTag,
}

#[derive(Debug, Deserialize)]
struct TxWire {
    hash: String,
}

#[derive(Debug, Serialize)]
struct CreateBetWire<'a> {
    account_id: &'a str,
    description: &'a str,
    creator: &'a str,
    opponent: &'a str,
    resolver: &'a str,
    /// Pooled stake in wei, as a decimal string.
    stake: String,
    path: &'a str,
    chain: ChainTag,
}

#[derive(Debug, Deserialize)]
struct CreateBetResponse {
    bet_id: u64,
    hash: String,
}

#[derive(Debug, Serialize)]
struct ResolveBetWire<'a> {
    account_id: &'a str,
    bet_id: u64,
    winner: &'a str,
    resolver: &'a str,
    path: &'a str,
    chain: ChainTag,
}

impl MpcSigner {
    pub fn new(base: Url, signer_account: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base,
            signer_account,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, String> {
        self.base
            .join(path)
            .map_err(|e| format!("invalid endpoint {path}: {e}"))
    }

    async fn broadcast_once(&self, request: &SendRequest) -> Result<TxReceipt, WalletError> {
        let url = self
            .endpoint("transactions")
            .map_err(|message| WalletError::Api { message })?;
        let response = self
            .http
            .post(url)
            .json(&SendWire {
                account_id: &self.signer_account,
                path: &request.path,
                from: &request.from,
                to: &request.to,
                value: request.value.to_string(),
                gas_limit: request.gas_limit,
                chain: request.chain,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WalletError::Api {
                message: format!("broadcast returned {status}: {body}"),
            });
        }
        let tx: TxWire = response.json().await?;
        Ok(TxReceipt {
            explorer_link: format!("{}{}", request.chain.explorer_base(), tx.hash),
            hash: tx.hash,
        })
    }
}

#[async_trait]
impl ChainWallet for MpcSigner {
    async fn derive_address(&self, path: &str, chain: ChainTag) -> Result<String, WalletError> {
        let url = self
            .endpoint("addresses")
            .map_err(|message| WalletError::Api { message })?;
        let response = self
            .http
            .post(url)
            .json(&DeriveRequest {
                account_id: &self.signer_account,
                path,
                chain,
            })
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            return Err(WalletError::UnsupportedChain(chain));
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(WalletError::Api {
                message: format!("derivation returned {status}"),
            });
        }
        let derived: DeriveResponse = response.json().await?;
        debug!(path, %chain, address = %derived.address, "Derived address");
        Ok(derived.address)
    }

    async fn send_native(&self, request: SendRequest) -> Result<TxReceipt, WalletError> {
        debug!(from = %request.from, to = %request.to, "Broadcasting native transfer");
        broadcast_with_retry(
            self.broadcast_once(&request),
            self.broadcast_once(&request),
            BROADCAST_RETRY_DELAY,
        )
        .await
    }
}

/// Await `first`; on failure, wait `delay` and await `retry` instead,
/// reporting its outcome. `retry` is never polled when `first` succeeds.
async fn broadcast_with_retry<T, E, A, B>(first: A, retry: B, delay: Duration) -> Result<T, E>
where
    A: Future<Output = Result<T, E>>,
    B: Future<Output = Result<T, E>>,
    E: Display,
{
    match first.await {
        Ok(value) => Ok(value),
        Err(error) => {
            warn!(%error, "Broadcast failed, retrying once");
            tokio::time::sleep(delay).await;
            retry.await
        }
    }
}

#[async_trait]
impl BetRegistry for MpcSigner {
    async fn create_bet(&self, request: CreateBetRequest) -> Result<CreatedBet, RegistryError> {
        let url = self
            .endpoint("bets")
            .map_err(|message| RegistryError::Api { message })?;
        let response = self
            .http
            .post(url)
            .json(&CreateBetWire {
                account_id: &self.signer_account,
                description: &request.description,
                creator: &request.creator,
                opponent: &request.opponent,
                resolver: &request.resolver,
                stake: request.total_stake.to_string(),
                path: &request.path,
                chain: request.chain,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Api {
                message: format!("bet creation returned {status}: {body}"),
            });
        }
        let created: CreateBetResponse = response.json().await?;
        info!(bet_id = created.bet_id, "Bet registered on chain");
        Ok(CreatedBet {
            bet_id: created.bet_id,
            explorer_link: format!("{}{}", request.chain.explorer_base(), created.hash),
        })
    }

    async fn resolve_bet(&self, request: ResolveBetRequest) -> Result<String, RegistryError> {
        let url = self
            .endpoint("bets/resolve")
            .map_err(|message| RegistryError::Api { message })?;
        let response = self
            .http
            .post(url)
            .json(&ResolveBetWire {
                account_id: &self.signer_account,
                bet_id: request.bet_id,
                winner: &request.winner,
                resolver: &request.resolver,
                path: &request.path,
                chain: request.chain,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Api {
                message: format!("bet resolution returned {status}: {body}"),
            });
        }
        let tx: TxWire = response.json().await?;
        info!(bet_id = request.bet_id, hash = %tx.hash, "Bet resolved on chain");
        Ok(format!("{}{}", request.chain.explorer_base(), tx.hash))
    }
}

#[async_trait]
impl BetArchive for MpcSigner {
    async fn record_bet(&self, record: &BetRecord) -> Result<(), ArchiveError> {
        let url = self
            .endpoint("archive/bets")
            .map_err(|message| ArchiveError::Api { message })?;
        let response = self.http.post(url).json(record).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ArchiveError::Api {
                message: format!("archive write returned {status}"),
            });
        }
        Ok(())
    }
}
