//! ReplyStage processor.
//!
//! The ReplyStage is responsible for:
//! - Popping one candidate post from the reply queue per cycle
//! - Parsing it into a structured bet intent via the oracle
//! - Rejecting malformed bets, non-positive stakes and self-bets with a
//!   user-visible reply (terminal, never retried)
//! - Deriving the two one-time deposit addresses
//! - Posting deposit instructions and queueing the new bet for deposit
//!   polling
//!
//! Transient failures (derivation, reply send) requeue the post with a
//! bumped attempt counter, bounded by the configured ceiling.

use crate::capabilities::{
    BetOracle, ChainWallet, ParseOutcome, ParsedBet, SocialError, SocialPlatform, WalletError,
};
use crate::config::{BotIdentity, LimitsConfig};
use crate::entities::bet::{Bet, deposit_path};
use crate::entities::post::Post;
use crate::ledger::BetLedger;
use crate::utils::amounts;
use kanau::processor::Processor;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

const USAGE_HELP: &str = "Sorry, I couldn't understand the bet format. \
Please use: \"@username I bet you X ETH that [condition]\"";
const NON_POSITIVE_STAKE: &str = "Sorry, the bet amount must be greater than 0 ETH.";
const SELF_BET: &str = "Sorry, you can't bet against yourself.";

/// Errors that roll a post back into the reply queue.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("address derivation error: {0}")]
    Wallet(#[from] WalletError),

    #[error("reply error: {0}")]
    Social(#[from] SocialError),

    /// Both paths derived to the same address; something is wrong with
    /// the signer, not the bet.
    #[error("deposit addresses collided for post {0}")]
    AddressCollision(String),
}

/// ReplyStage turns candidate posts into bets awaiting deposits.
pub struct ReplyStage {
    ledger: Arc<BetLedger>,
    social: Arc<dyn SocialPlatform>,
    oracle: Arc<dyn BetOracle>,
    wallet: Arc<dyn ChainWallet>,
    identity: BotIdentity,
    limits: LimitsConfig,
    delay: Duration,
}

impl ReplyStage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<BetLedger>,
        social: Arc<dyn SocialPlatform>,
        oracle: Arc<dyn BetOracle>,
        wallet: Arc<dyn ChainWallet>,
        identity: BotIdentity,
        limits: LimitsConfig,
        delay: Duration,
    ) -> Self {
        Self {
            ledger,
            social,
            oracle,
            wallet,
            identity,
            limits,
            delay,
        }
    }

    /// Run the ReplyStage until shutdown is signaled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("ReplyStage started");

        loop {
            if super::sleep_or_shutdown(&mut shutdown_rx, self.delay).await {
                info!("ReplyStage received shutdown signal");
                break;
            }
            if let Some(post) = self.ledger.pop_reply().await {
                let _ = self.process(post).await;
            }
        }

        info!("ReplyStage shutdown complete");
    }

    /// Post a terminal user-error reply. Best-effort: a failed error reply
    /// is logged, never retried, since the post itself is being dropped.
    async fn send_terminal_reply(&self, text: &str, post: &Post) {
        if let Err(e) = self.social.reply(text, &post.id).await {
            warn!(post_id = %post.id, error = %e, "Failed to deliver error reply");
        }
    }

    /// Derive both deposit addresses, post the instructions and build the
    /// bet record.
    async fn open_bet(
        &self,
        post: &Post,
        parsed: &ParsedBet,
        stake: u128,
    ) -> Result<Bet, ReplyError> {
        let chain = parsed.chain.unwrap_or(self.identity.default_chain);

        let author_bet_path = deposit_path(&post.author_username, &post.id);
        let author_deposit_address = self.wallet.derive_address(&author_bet_path, chain).await?;

        let opponent_bet_path = deposit_path(&parsed.opponent, &post.id);
        let opponent_deposit_address =
            self.wallet.derive_address(&opponent_bet_path, chain).await?;

        if author_deposit_address == opponent_deposit_address {
            return Err(ReplyError::AddressCollision(post.id.to_string()));
        }

        let formatted_stake = amounts::format_eth(stake);
        let reply_id = self
            .social
            .reply(
                &format!(
                    "I got you!\n@{} deposit {} ETH to {}\nand @{} deposit {} ETH to {}",
                    post.author_username,
                    formatted_stake,
                    author_deposit_address,
                    parsed.opponent,
                    formatted_stake,
                    opponent_deposit_address,
                ),
                &post.id,
            )
            .await?;

        Ok(Bet {
            id: post.id.clone(),
            conversation_id: post.conversation_id.clone().unwrap_or_else(|| post.id.clone()),
            creator_username: post.author_username.clone(),
            opponent_username: parsed.opponent.clone(),
            description: parsed.terms.clone(),
            stake,
            chain,
            most_recent_post_id: reply_id,
            author_bet_path,
            author_deposit_address,
            opponent_bet_path,
            opponent_deposit_address,
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
            created_at: post.created_at,
        })
    }
}

impl Processor<Post> for ReplyStage {
    type Output = ();
    type Error = Infallible;

    async fn process(&self, mut post: Post) -> Result<(), Infallible> {
        if post.reply_attempt >= self.limits.max_reply_attempts {
            warn!(post_id = %post.id, "Reply attempts exhausted, dropping post");
            return Ok(());
        }

        let outcome = match self.oracle.parse_bet(&post.text).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "Bet parsing failed, treating as invalid");
                ParseOutcome::Invalid
            }
        };

        let parsed = match outcome {
            ParseOutcome::Bet(parsed) => parsed,
            ParseOutcome::Invalid => {
                info!(post_id = %post.id, "Not a well-formed bet, replying with usage help");
                self.send_terminal_reply(USAGE_HELP, &post).await;
                return Ok(());
            }
        };

        let stake = amounts::eth_to_wei(parsed.amount).unwrap_or(0);
        if stake == 0 {
            info!(post_id = %post.id, amount = %parsed.amount, "Non-positive stake, dropping");
            self.send_terminal_reply(NON_POSITIVE_STAKE, &post).await;
            return Ok(());
        }

        if parsed.opponent.eq_ignore_ascii_case(&post.author_username) {
            info!(post_id = %post.id, "Author challenged themselves, dropping");
            self.send_terminal_reply(SELF_BET, &post).await;
            return Ok(());
        }

        match self.open_bet(&post, &parsed, stake).await {
            Ok(bet) => {
                info!(
                    post_id = %post.id,
                    creator = %bet.creator_username,
                    opponent = %bet.opponent_username,
                    stake = bet.stake,
                    "Bet opened, awaiting deposits"
                );
                self.ledger.push_deposit(bet).await;
            }
            Err(e) => {
                warn!(
                    post_id = %post.id,
                    attempt = post.reply_attempt,
                    error = %e,
                    "Transient failure, requeueing post"
                );
                post.reply_attempt += 1;
                self.ledger.push_reply(post).await;
            }
        }
        Ok(())
    }
}
