//! Runtime configuration types for the orchestrator.
//!
//! These types represent validated runtime configuration shared across
//! crates. Loading and parsing from the TOML file is handled by the
//! server crate.

use crate::entities::ChainTag;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Identity of the bot account the orchestrator operates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotIdentity {
    /// Handle on the social platform, without the leading `@`.
    pub name: String,
    /// Platform account id, used to skip the bot's own posts in discovery.
    pub platform_id: String,
    /// Account owning the shared signing key from which deposit addresses
    /// are derived.
    pub signer_account: String,
    /// Search pattern for new bet challenges.
    pub bet_query: String,
    /// Search pattern for settlement requests.
    pub settle_query: String,
    /// Network used when a parsed bet names no chain.
    pub default_chain: ChainTag,
}

/// Delays and polling cadence for the stage loops, in seconds on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Pause between reply-stage iterations.
    #[serde(with = "secs")]
    pub reply_delay: Duration,
    /// Pause between deposit-stage iterations. Together with
    /// [`LimitsConfig::max_deposit_attempts`] this bounds how long a bet
    /// waits for deposits.
    #[serde(with = "secs")]
    pub deposit_delay: Duration,
    /// Pause between settlement-stage iterations.
    #[serde(with = "secs")]
    pub settlement_delay: Duration,
    /// Pause between refund-stage iterations.
    #[serde(with = "secs")]
    pub refund_delay: Duration,
    /// Pause between full discovery cycles.
    #[serde(with = "secs")]
    pub polling_interval: Duration,
    /// Gap between the bet search and the settle search within one cycle.
    #[serde(with = "secs")]
    pub settle_search_gap: Duration,
    /// How far before startup the initial search floors reach back. Posts
    /// older than this window at boot are never ingested, so a restart
    /// does not replay search history.
    #[serde(with = "secs", default = "default_search_backfill")]
    pub search_backfill: Duration,
}

fn default_search_backfill() -> Duration {
    Duration::from_secs(100)
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reply_delay: Duration::from_secs(30),
            deposit_delay: Duration::from_secs(5),
            settlement_delay: Duration::from_secs(30),
            refund_delay: Duration::from_secs(30),
            polling_interval: Duration::from_secs(300),
            settle_search_gap: Duration::from_secs(60),
            search_backfill: default_search_backfill(),
        }
    }
}

/// Attempt ceilings. Reaching a ceiling is a terminal transition, never
/// an infinite loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Transient reply failures tolerated before a post is dropped.
    #[serde(default = "default_reply_attempts")]
    pub max_reply_attempts: u32,
    /// Deposit polling cycles before a bet moves to refund
    /// (720 cycles at 5s ≈ one hour).
    #[serde(default = "default_deposit_attempts")]
    pub max_deposit_attempts: u32,
    /// Settlement failures tolerated before a bet moves to refund.
    #[serde(default = "default_settlement_attempts")]
    pub max_settlement_attempts: u32,
}

fn default_reply_attempts() -> u32 {
    3
}

fn default_deposit_attempts() -> u32 {
    720
}

fn default_settlement_attempts() -> u32 {
    3
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_reply_attempts: default_reply_attempts(),
            max_deposit_attempts: default_deposit_attempts(),
            max_settlement_attempts: default_settlement_attempts(),
        }
    }
}

/// Feature toggles, swappable at runtime (SIGHUP reload).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Toggles {
    /// Discovery logs matches instead of queueing or replying.
    #[serde(default)]
    pub search_only: bool,
    /// The social adapter logs outbound replies and fabricates post ids
    /// instead of posting.
    #[serde(default)]
    pub fake_reply: bool,
    /// Whether the refund stage drains its queue at all.
    #[serde(default = "default_true")]
    pub refund_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Toggles {
    fn default() -> Self {
        Self {
            search_only: false,
            fake_reply: false,
            refund_enabled: true,
        }
    }
}

/// Shared toggle state. Cloning shares the underlying store.
#[derive(Clone)]
pub struct ToggleStore {
    inner: Arc<RwLock<Toggles>>,
}

impl ToggleStore {
    pub fn new(initial: Toggles) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub async fn read(&self) -> Toggles {
        *self.inner.read().await
    }

    /// Replace the stored toggles (used during SIGHUP reload).
    pub async fn update(&self, toggles: Toggles) {
        *self.inner.write().await = toggles;
    }
}

/// Everything the orchestrator needs beyond its capability adapters.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub identity: BotIdentity,
    pub timing: TimingConfig,
    pub limits: LimitsConfig,
}

mod secs {
    //! Serialize `Duration` as a plain seconds integer.

    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
