pub mod bet;
pub mod post;

use serde::{Deserialize, Serialize};

/// Target network for deposits, escrow and settlement.
///
/// The orchestrator is chain-agnostic; every capability call carries the
/// tag so adapters can pick the right chain id and explorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainTag {
    Ethereum,
    Sepolia,
    Base,
    BaseSepolia,
}

impl ChainTag {
    /// EVM chain id, as used by EtherScan-compatible APIs.
    pub fn chain_id(self) -> u64 {
        match self {
            ChainTag::Ethereum => 1,
            ChainTag::Sepolia => 11155111,
            ChainTag::Base => 8453,
            ChainTag::BaseSepolia => 84532,
        }
    }

    /// Base URL of the public block explorer for transaction links.
    pub fn explorer_base(self) -> &'static str {
        match self {
            ChainTag::Ethereum => "https://etherscan.io/tx/",
            ChainTag::Sepolia => "https://sepolia.etherscan.io/tx/",
            ChainTag::Base => "https://basescan.org/tx/",
            ChainTag::BaseSepolia => "https://sepolia.basescan.org/tx/",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChainTag::Ethereum => "ethereum",
            ChainTag::Sepolia => "sepolia",
            ChainTag::Base => "base",
            ChainTag::BaseSepolia => "base-sepolia",
        }
    }
}

impl std::fmt::Display for ChainTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
