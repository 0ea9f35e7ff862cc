//! SettlementStage processor.
//!
//! The SettlementStage is responsible for:
//! - Parking bets until one party has requested settlement (untriggered
//!   bets cycle back to the queue tail)
//! - Resolving the outcome of triggered bets via the oracle
//! - Paying the winner through the escrow contract and announcing the
//!   result
//! - Counting failed attempts and routing to refund once the ceiling is
//!   reached, flagged for manual review
//!
//! Payout is 99% of the pooled stake, rounded down; the remaining 1%
//! stays at the resolver address as the protocol fee.

use crate::capabilities::{BetOracle, BetRegistry, ResolveBetRequest, SocialPlatform, Verdict};
use crate::config::LimitsConfig;
use crate::entities::bet::Bet;
use crate::ledger::BetLedger;
use crate::utils::amounts;
use compact_str::CompactString;
use kanau::processor::Processor;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// SettlementStage resolves triggered bets and pays winners.
pub struct SettlementStage {
    ledger: Arc<BetLedger>,
    oracle: Arc<dyn BetOracle>,
    registry: Arc<dyn BetRegistry>,
    social: Arc<dyn SocialPlatform>,
    limits: LimitsConfig,
    delay: Duration,
}

impl SettlementStage {
    pub fn new(
        ledger: Arc<BetLedger>,
        oracle: Arc<dyn BetOracle>,
        registry: Arc<dyn BetRegistry>,
        social: Arc<dyn SocialPlatform>,
        limits: LimitsConfig,
        delay: Duration,
    ) -> Self {
        Self {
            ledger,
            oracle,
            registry,
            social,
            limits,
            delay,
        }
    }

    /// Run the SettlementStage until shutdown is signaled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("SettlementStage started");

        loop {
            if super::sleep_or_shutdown(&mut shutdown_rx, self.delay).await {
                info!("SettlementStage received shutdown signal");
                break;
            }
            if let Some(bet) = self.ledger.pop_settlement().await {
                let _ = self.process(bet).await;
            }
        }

        info!("SettlementStage shutdown complete");
    }

    /// Count a failed attempt and requeue, or give up into refund once the
    /// ceiling is reached.
    async fn retry_or_refund(&self, mut bet: Bet, reason: &str) {
        bet.settlement_attempt += 1;
        if bet.settlement_attempt < self.limits.max_settlement_attempts {
            warn!(
                bet = %bet.id,
                attempt = bet.settlement_attempt,
                reason,
                "Settlement failed, retrying later"
            );
            self.ledger.push_settlement(bet).await;
        } else {
            error!(
                bet = %bet.id,
                attempts = bet.settlement_attempt,
                reason,
                "Repeated settlement failures, needs manual review"
            );
            self.ledger.push_refund(bet).await;
        }
    }

    async fn announce_settled(
        &self,
        bet: &Bet,
        winner: &str,
        rationale: &str,
        tx_link: &str,
        reply_to: &str,
    ) {
        let text = format!(
            "Bet settled! 🎉\n\n@{} won {} ETH\n\nReason: the bet resolver returned \"{}\"\n\nTx: {}",
            winner,
            amounts::format_eth(amounts::winner_payout(bet.stake)),
            rationale,
            tx_link,
        );
        if let Err(e) = self.social.reply(&text, reply_to).await {
            warn!(bet = %bet.id, error = %e, "Failed to announce settlement");
        }
    }
}

impl Processor<Bet> for SettlementStage {
    type Output = ();
    type Error = Infallible;

    async fn process(&self, mut bet: Bet) -> Result<(), Infallible> {
        // No trigger yet: the settlement queue is a parked working set,
        // not a strict drain.
        let Some(trigger) = bet.settlement_trigger.clone() else {
            debug!(bet = %bet.id, "No settlement request yet, parking");
            self.ledger.push_settlement(bet).await;
            return Ok(());
        };

        // A triggered bet always came through the deposit stage; missing
        // chain state means damage we cannot settle through.
        let (Some(bet_id), Some(resolver), Some(path)) = (
            bet.bet_id,
            bet.resolver_address.clone(),
            bet.bet_path.clone(),
        ) else {
            error!(bet = %bet.id, "Triggered bet lacks chain state, needs manual review");
            self.ledger.push_refund(bet).await;
            return Ok(());
        };

        let ruling = match self.oracle.resolve_outcome(&bet.description).await {
            Ok(ruling) => ruling,
            Err(e) => {
                self.retry_or_refund(bet, &e.to_string()).await;
                return Ok(());
            }
        };

        let (winner_address, winner_username): (Option<String>, CompactString) =
            match ruling.verdict {
                Verdict::CreatorWins => (bet.creator_address.clone(), bet.creator_username.clone()),
                Verdict::OpponentWins => {
                    (bet.opponent_address.clone(), bet.opponent_username.clone())
                }
            };
        let Some(winner_address) = winner_address else {
            error!(bet = %bet.id, "Winner has no recovered address, needs manual review");
            self.ledger.push_refund(bet).await;
            return Ok(());
        };

        match self
            .registry
            .resolve_bet(ResolveBetRequest {
                bet_id,
                winner: winner_address,
                resolver,
                path,
                chain: bet.chain,
            })
            .await
        {
            Ok(tx_link) => {
                info!(bet = %bet.id, winner = %winner_username, "Bet settled");
                self.announce_settled(&bet, &winner_username, &ruling.rationale, &tx_link, &trigger.id)
                    .await;
                bet.winner = Some(winner_username);
                bet.settlement_tx = Some(tx_link);
                self.ledger.complete(bet).await;
            }
            Err(e) => {
                self.retry_or_refund(bet, &e.to_string()).await;
            }
        }
        Ok(())
    }
}
