//! Configuration module for owes-server.
//!
//! Handles loading configuration from the TOML file, CLI arguments,
//! and environment variables. Also handles admin secret hashing.

pub mod file;

use crate::config::file::FileConfig;
use owes_core::config::{BotIdentity, OrchestratorConfig, Toggles};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("{0} environment variable not set")]
    MissingSecret(&'static str),
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub autostart: bool,
    /// Argon2 hash of the admin secret.
    pub admin_secret_hash: String,
    pub orchestrator: OrchestratorConfig,
    pub endpoints: file::EndpointsConfig,
    pub toggles: Toggles,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the admin secret if it's plaintext (and rewrite the file)
    /// 5. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        self.validate(&file_config)?;

        let secret_hash = if file_config.is_admin_secret_hashed() {
            file_config.admin.secret.clone()
        } else {
            let hash = self.hash_secret(&file_config.admin.secret)?;
            file_config.admin.secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Admin secret hashed and config file updated");
            hash
        };

        Ok(build_loaded_config(file_config, secret_hash))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        if config.bot.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "bot.name must not be empty".to_owned(),
            ));
        }
        if config.bot.bet_query.is_empty() || config.bot.settle_query.is_empty() {
            return Err(ConfigError::ValidationError(
                "bot.bet_query and bot.settle_query must not be empty".to_owned(),
            ));
        }
        Ok(())
    }

    fn hash_secret(&self, plaintext: &str) -> Result<String, ConfigError> {
        use argon2::{
            Argon2, PasswordHasher,
            password_hash::{SaltString, rand_core::OsRng},
        };

        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ConfigError::HashError(e.to_string()))
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn build_loaded_config(file_config: FileConfig, secret_hash: String) -> LoadedConfig {
    let bot = file_config.bot;
    LoadedConfig {
        listen: file_config.server.listen,
        autostart: file_config.server.autostart,
        admin_secret_hash: secret_hash,
        orchestrator: OrchestratorConfig {
            identity: BotIdentity {
                name: bot.name,
                platform_id: bot.platform_id,
                signer_account: bot.signer_account,
                bet_query: bot.bet_query,
                settle_query: bot.settle_query,
                default_chain: bot.default_chain,
            },
            timing: file_config.timing.unwrap_or_default(),
            limits: file_config.limits.unwrap_or_default(),
        },
        endpoints: file_config.endpoints,
        toggles: file_config.toggles.unwrap_or_default(),
    }
}

/// Secrets read from the environment rather than the config file.
pub struct Secrets {
    /// Bearer token for the social platform API.
    pub social_bearer: String,
    /// Auth token for the agent oracle.
    pub oracle_auth: String,
    /// EtherScan-compatible explorer API key.
    pub etherscan_api_key: String,
}

impl Secrets {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            social_bearer: require_env("SOCIAL_BEARER_TOKEN")?,
            oracle_auth: require_env("ORACLE_AUTH_TOKEN")?,
            etherscan_api_key: require_env("ETHERSCAN_API_KEY")?,
        })
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingSecret(name))
}
