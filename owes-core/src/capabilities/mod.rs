//! External capability interfaces consumed by the stage processors.
//!
//! Each collaborator — social platform, AI oracle, chain explorer, MPC
//! wallet, escrow registry, archive — is a trait here plus an HTTP
//! implementation in a sibling module. Stage processors depend only on
//! the traits, so tests swap in scripted stand-ins.

pub mod explorer;
pub mod oracle;
pub mod signer;
pub mod social;

#[cfg(test)]
pub mod fixtures;

pub use explorer::EtherScanExplorer;
pub use oracle::AgentOracle;
pub use signer::MpcSigner;
pub use social::HttpSocialPlatform;

use crate::entities::ChainTag;
use crate::entities::bet::BetRecord;
use crate::entities::post::Post;
use crate::utils::amounts::FeeEstimate;
use async_trait::async_trait;
use compact_str::CompactString;
use rust_decimal::Decimal;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Social platform
// ---------------------------------------------------------------------------

/// Errors from the social platform adapter.
#[derive(Debug, Error)]
pub enum SocialError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("platform error: {message}")]
    Api { message: String },
}

/// Search and reply on the social platform.
#[async_trait]
pub trait SocialPlatform: Send + Sync {
    /// Search for posts matching `query` created after `since` (epoch
    /// seconds). Order is whatever the platform returns.
    async fn search(&self, query: &str, since: i64) -> Result<Vec<Post>, SocialError>;

    /// Post a reply under `reply_to`. Returns the id of the new post.
    async fn reply(&self, text: &str, reply_to: &str) -> Result<CompactString, SocialError>;
}

// ---------------------------------------------------------------------------
// AI oracle
// ---------------------------------------------------------------------------

/// Errors from the AI oracle adapter.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("agent error: {message}")]
    Api { message: String },

    #[error("no assistant reply within the deadline")]
    Timeout,
}

/// A bet intent extracted from free-form post text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBet {
    /// Opponent handle, without the leading `@`.
    pub opponent: CompactString,
    /// Stake in decimal ETH, as written in the post.
    pub amount: Decimal,
    /// The wagered condition.
    pub terms: String,
    /// Target network, when the post names one.
    pub chain: Option<ChainTag>,
}

/// Result of parsing a candidate post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Bet(ParsedBet),
    /// The post is not a well-formed bet. User error, never retried.
    Invalid,
}

/// Binary settlement verdict. No tie or void outcome is modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    CreatorWins,
    OpponentWins,
}

/// Outcome resolution with the model's stated reasoning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ruling {
    pub verdict: Verdict,
    /// Free-text reasoning, quoted in the settlement reply.
    pub rationale: String,
}

/// Natural-language understanding of bets: intent parsing and outcome
/// resolution.
#[async_trait]
pub trait BetOracle: Send + Sync {
    /// Extract a structured bet intent from post text.
    async fn parse_bet(&self, text: &str) -> Result<ParseOutcome, OracleError>;

    /// Decide the outcome of a bet from its terms.
    async fn resolve_outcome(&self, terms: &str) -> Result<Ruling, OracleError>;
}

// ---------------------------------------------------------------------------
// Chain explorer
// ---------------------------------------------------------------------------

/// Errors from the chain explorer adapter.
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("explorer API error: {message}")]
    Api { message: String },

    #[error("explorer response parsing error: {0}")]
    Parse(String),
}

/// How value arrived at an address. Refunds to contract senders need a
/// larger gas limit than refunds to externally-owned accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    Normal,
    Internal,
}

/// The most recent transaction into an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundTx {
    pub sender: String,
    pub kind: InboundKind,
}

/// Read-only chain state via an explorer API.
#[async_trait]
pub trait ChainExplorer: Send + Sync {
    /// Native-token balance of `address`, in wei.
    async fn native_balance(&self, address: &str, chain: ChainTag) -> Result<u128, ExplorerError>;

    /// The transaction that funded `address`, normal transfers first with
    /// internal transactions as fallback. `None` when the address has
    /// never received anything.
    async fn latest_inbound(
        &self,
        address: &str,
        chain: ChainTag,
    ) -> Result<Option<InboundTx>, ExplorerError>;

    /// Current EIP-1559 fee estimate.
    async fn fee_estimate(&self, chain: ChainTag) -> Result<FeeEstimate, ExplorerError>;
}

// ---------------------------------------------------------------------------
// MPC wallet
// ---------------------------------------------------------------------------

/// Errors from the MPC signing service.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("signer error: {message}")]
    Api { message: String },

    #[error("unsupported chain: {0}")]
    UnsupportedChain(ChainTag),
}

/// A native-token transfer to sign and broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    /// Derivation path controlling the sending address.
    pub path: String,
    pub from: String,
    pub to: String,
    /// Amount in wei.
    pub value: u128,
    pub gas_limit: u64,
    pub chain: ChainTag,
}

/// A broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: String,
    pub explorer_link: String,
}

/// Address derivation and transaction signing over a shared MPC key.
/// The raw private key never leaves the signing service.
#[async_trait]
pub trait ChainWallet: Send + Sync {
    /// Derive the one-time address for `path` on `chain`.
    async fn derive_address(&self, path: &str, chain: ChainTag) -> Result<String, WalletError>;

    /// Sign and broadcast a native transfer.
    async fn send_native(&self, request: SendRequest) -> Result<TxReceipt, WalletError>;
}

// ---------------------------------------------------------------------------
// Escrow registry
// ---------------------------------------------------------------------------

/// Errors from the on-chain escrow registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("registry error: {message}")]
    Api { message: String },
}

/// Parameters for registering a bet on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBetRequest {
    pub description: String,
    pub creator: String,
    pub opponent: String,
    pub resolver: String,
    /// Pooled stake (both parties), in wei.
    pub total_stake: u128,
    /// Derivation path of the resolver address funding the call.
    pub path: String,
    pub chain: ChainTag,
}

/// A bet registered on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedBet {
    pub bet_id: u64,
    pub explorer_link: String,
}

/// Parameters for resolving a bet on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveBetRequest {
    pub bet_id: u64,
    pub winner: String,
    pub resolver: String,
    pub path: String,
    pub chain: ChainTag,
}

/// The on-chain escrow contract, driven through the signing service.
#[async_trait]
pub trait BetRegistry: Send + Sync {
    async fn create_bet(&self, request: CreateBetRequest) -> Result<CreatedBet, RegistryError>;

    /// Pay the winner and close the bet. Returns the settlement
    /// transaction's explorer link.
    async fn resolve_bet(&self, request: ResolveBetRequest) -> Result<String, RegistryError>;
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

/// Errors from the bet-metadata archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("archive error: {message}")]
    Api { message: String },
}

/// Append-only store of bet metadata. Best-effort: callers log failures
/// and move on.
#[async_trait]
pub trait BetArchive: Send + Sync {
    async fn record_bet(&self, record: &BetRecord) -> Result<(), ArchiveError>;
}
