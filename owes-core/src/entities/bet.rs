use super::ChainTag;
use super::post::Post;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// One wager attempt, tracked from the triggering post through escrow and
/// settlement.
///
/// A bet lives in exactly one lifecycle queue at any time; stage processors
/// mutate it as it advances. `stake` is per party, in wei.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    /// Id of the post that created the bet.
    pub id: CompactString,
    /// Conversation the bet was opened in (the post id itself when the
    /// platform does not report a conversation).
    pub conversation_id: CompactString,
    pub creator_username: CompactString,
    pub opponent_username: CompactString,
    /// Free-text terms of the wager.
    pub description: String,
    /// Per-party stake in wei.
    pub stake: u128,
    pub chain: ChainTag,
    /// Where further replies should be threaded.
    pub most_recent_post_id: CompactString,

    // Derived one-time deposit addressing, one path per party.
    pub author_bet_path: String,
    pub author_deposit_address: String,
    pub opponent_bet_path: String,
    pub opponent_deposit_address: String,

    /// Address pooling both stakes before on-chain creation, derived once
    /// both deposits have landed.
    pub resolver_address: Option<String>,
    /// Derivation path of the resolver address.
    pub bet_path: Option<String>,

    /// On-chain identifier, set only after a successful create call.
    pub bet_id: Option<u64>,
    pub total_deposited: bool,
    /// On-chain sender of the creator's deposit.
    pub creator_address: Option<String>,
    /// On-chain sender of the opponent's deposit.
    pub opponent_address: Option<String>,

    /// The post that requested settlement, once one party has asked.
    pub settlement_trigger: Option<Post>,
    pub deposit_attempt: u32,
    pub settlement_attempt: u32,

    /// Winning handle, set only after a successful on-chain resolve.
    pub winner: Option<CompactString>,
    /// Explorer link of the settlement transaction.
    pub settlement_tx: Option<String>,

    /// Creation time, seconds since epoch.
    pub created_at: i64,
}

impl Bet {
    /// Whether `username` is one of the two parties (case-insensitive, as
    /// platform handles are).
    pub fn involves(&self, username: &str) -> bool {
        self.creator_username.eq_ignore_ascii_case(username)
            || self.opponent_username.eq_ignore_ascii_case(username)
    }
}

/// Deterministic derivation path for a party's one-time deposit address.
pub fn deposit_path(username: &str, post_id: &str) -> String {
    format!("{username}-{post_id}")
}

/// Deterministic derivation path for the per-bet resolver address.
pub fn resolver_path(post_id: &str) -> String {
    format!("resolver-{post_id}")
}

/// Structured record written to the archive collaborator after a bet is
/// registered on chain. Fire-and-forget; field names follow the archive
/// contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRecord {
    pub initiator: String,
    pub opponent: String,
    pub chain: String,
    pub terms: String,
    pub currency: String,
    /// Per-party stake in wei, as a decimal string.
    pub amount: String,
    pub parent_id: CompactString,
    pub current_id: CompactString,
    pub remarks: String,
}

impl BetRecord {
    /// Build a record from a bet whose parties are known. Returns `None`
    /// before both deposit senders have been recovered.
    pub fn from_bet(bet: &Bet) -> Option<Self> {
        Some(Self {
            initiator: bet.creator_address.clone()?,
            opponent: bet.opponent_address.clone()?,
            chain: bet.chain.as_str().to_owned(),
            terms: bet.description.clone(),
            currency: "ETH".to_owned(),
            amount: bet.stake.to_string(),
            parent_id: bet.conversation_id.clone(),
            current_id: bet.id.clone(),
            remarks: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bet() -> Bet {
        Bet {
            id: "100".into(),
            conversation_id: "90".into(),
            creator_username: "alice".into(),
            opponent_username: "bob".into(),
            description: "it rains on friday".to_owned(),
            stake: 100,
            chain: ChainTag::BaseSepolia,
            most_recent_post_id: "101".into(),
            author_bet_path: deposit_path("alice", "100"),
            author_deposit_address: "0xaaa".to_owned(),
            opponent_bet_path: deposit_path("bob", "100"),
            opponent_deposit_address: "0xbbb".to_owned(),
            resolver_address: None,
            bet_path: None,
            bet_id: None,
            total_deposited: false,
            creator_address: None,
            opponent_address: None,
            settlement_trigger: None,
            deposit_attempt: 0,
            settlement_attempt: 0,
            winner: None,
            settlement_tx: None,
            created_at: 0,
        }
    }

    #[test]
    fn involvement_is_case_insensitive() {
        let bet = sample_bet();
        assert!(bet.involves("Alice"));
        assert!(bet.involves("BOB"));
        assert!(!bet.involves("carol"));
    }

    #[test]
    fn distinct_parties_get_distinct_paths() {
        assert_ne!(deposit_path("alice", "100"), deposit_path("bob", "100"));
        assert_ne!(deposit_path("alice", "100"), resolver_path("100"));
    }

    #[test]
    fn record_requires_recovered_parties() {
        let mut bet = sample_bet();
        assert!(BetRecord::from_bet(&bet).is_none());

        bet.creator_address = Some("0x1".to_owned());
        bet.opponent_address = Some("0x2".to_owned());
        let record = BetRecord::from_bet(&bet).unwrap();
        assert_eq!(record.amount, "100");
        assert_eq!(record.parent_id, "90");
    }
}
