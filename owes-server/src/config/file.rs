//! TOML file configuration structures.
//!
//! These structs directly map to the `owes-config.toml` file format.

use owes_core::config::{LimitsConfig, TimingConfig, Toggles};
use owes_core::entities::ChainTag;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub bot: BotConfig,
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub timing: Option<TimingConfig>,
    #[serde(default)]
    pub limits: Option<LimitsConfig>,
    #[serde(default)]
    pub toggles: Option<Toggles>,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
    /// Whether the stage loops start as soon as the server boots.
    /// When false they wait for `POST /api/start`.
    #[serde(default)]
    pub autostart: bool,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Admin configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The admin secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub secret: String,
}

/// Bot identity section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Handle on the social platform, without the leading `@`.
    pub name: String,
    /// Platform account id of the bot.
    pub platform_id: String,
    /// Account owning the shared signing key.
    pub signer_account: String,
    /// Search pattern for new bet challenges.
    pub bet_query: String,
    /// Search pattern for settlement requests.
    pub settle_query: String,
    /// Network used when a parsed bet names no chain.
    #[serde(default = "default_chain")]
    pub default_chain: ChainTag,
}

fn default_chain() -> ChainTag {
    ChainTag::BaseSepolia
}

/// External service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// Social platform API base URL.
    pub social: url::Url,
    /// Agent oracle API base URL.
    pub oracle: url::Url,
    /// Signing service base URL.
    pub signer: url::Url,
    /// Agent id answering bet-parse requests.
    pub parser_agent: String,
    /// Agent id answering bet-resolution requests.
    pub resolver_agent: String,
}

impl FileConfig {
    /// Check if the admin secret is already hashed (argon2 format).
    pub fn is_admin_secret_hashed(&self) -> bool {
        self.admin.secret.starts_with("$argon2")
    }
}
