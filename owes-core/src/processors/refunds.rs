//! RefundStage processor.
//!
//! The RefundStage is responsible for:
//! - Returning deposited funds when a bet could not be completed
//! - Identifying each depositor from the transaction that funded their
//!   one-time deposit address
//! - Sending the balance back minus the worst-case gas fee and a safety
//!   buffer, then dropping the bet
//!
//! Refunds are best-effort and run in a single pass. A bet whose refund
//! fails is logged for manual review rather than retried forever; the
//! funds stay recoverable at the derived addresses. Deployments can
//! disable this stage entirely through the refund toggle.

use crate::capabilities::{ChainExplorer, ChainWallet, InboundKind, SendRequest};
use crate::config::ToggleStore;
use crate::entities::bet::Bet;
use crate::ledger::BetLedger;
use crate::utils::amounts::{self, CONTRACT_TRANSFER_GAS_LIMIT, TRANSFER_GAS_LIMIT};
use kanau::processor::Processor;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// RefundStage returns stranded deposits to their senders.
pub struct RefundStage {
    ledger: Arc<BetLedger>,
    explorer: Arc<dyn ChainExplorer>,
    wallet: Arc<dyn ChainWallet>,
    toggles: ToggleStore,
    delay: Duration,
}

impl RefundStage {
    pub fn new(
        ledger: Arc<BetLedger>,
        explorer: Arc<dyn ChainExplorer>,
        wallet: Arc<dyn ChainWallet>,
        toggles: ToggleStore,
        delay: Duration,
    ) -> Self {
        Self {
            ledger,
            explorer,
            wallet,
            toggles,
            delay,
        }
    }

    /// Run the RefundStage until shutdown is signaled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("RefundStage started");

        loop {
            if super::sleep_or_shutdown(&mut shutdown_rx, self.delay).await {
                info!("RefundStage received shutdown signal");
                break;
            }
            if !self.toggles.read().await.refund_enabled {
                continue;
            }
            if let Some(bet) = self.ledger.pop_refund().await {
                let _ = self.process(bet).await;
            }
        }

        info!("RefundStage shutdown complete");
    }

    /// Refund whatever sits at one deposit address back to its depositor.
    /// Returns `Ok(false)` when there was nothing to refund.
    async fn refund_address(
        &self,
        bet: &Bet,
        path: &str,
        address: &str,
    ) -> Result<bool, RefundError> {
        let Some(inbound) = self.explorer.latest_inbound(address, bet.chain).await? else {
            debug!(bet = %bet.id, address, "No inbound transaction, nothing to refund");
            return Ok(false);
        };
        // Sending back to a contract needs enough gas for its receive hook.
        let gas_limit = match inbound.kind {
            InboundKind::Normal => TRANSFER_GAS_LIMIT,
            InboundKind::Internal => CONTRACT_TRANSFER_GAS_LIMIT,
        };

        let balance = self.explorer.native_balance(address, bet.chain).await?;
        let fee = self.explorer.fee_estimate(bet.chain).await?;
        let Some(value) = amounts::sendable(balance, fee, gas_limit) else {
            debug!(bet = %bet.id, address, balance, "Balance below refundable threshold");
            return Ok(false);
        };

        let receipt = self
            .wallet
            .send_native(SendRequest {
                path: path.to_owned(),
                from: address.to_owned(),
                to: inbound.sender.clone(),
                value,
                gas_limit,
                chain: bet.chain,
            })
            .await?;
        info!(
            bet = %bet.id,
            to = %inbound.sender,
            amount = %amounts::format_eth(value),
            tx = %receipt.explorer_link,
            "Refund sent"
        );
        Ok(true)
    }
}

impl Processor<Bet> for RefundStage {
    type Output = ();
    type Error = Infallible;

    async fn process(&self, bet: Bet) -> Result<(), Infallible> {
        let parties = [
            (
                bet.author_bet_path.as_str(),
                bet.author_deposit_address.as_str(),
            ),
            (
                bet.opponent_bet_path.as_str(),
                bet.opponent_deposit_address.as_str(),
            ),
        ];

        let mut refunded = 0usize;
        for (path, address) in parties {
            match self.refund_address(&bet, path, address).await {
                Ok(true) => refunded += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(bet = %bet.id, address, error = %e, "Refund failed, needs manual review");
                }
            }
        }

        // Single pass either way; unrecovered funds stay at the derived
        // addresses and are reported above.
        info!(bet = %bet.id, refunded, "Refund pass complete, dropping bet");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum RefundError {
    #[error("explorer lookup failed: {0}")]
    Explorer(#[from] crate::capabilities::ExplorerError),
    #[error("refund transfer failed: {0}")]
    Wallet(#[from] crate::capabilities::WalletError),
}
