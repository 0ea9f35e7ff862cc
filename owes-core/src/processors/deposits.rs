//! DepositStage processor.
//!
//! The DepositStage is responsible for:
//! - Polling both deposit addresses until each holds at least the stake
//! - Recovering the true party addresses from the depositing transactions
//! - Sweeping both deposits to the per-bet resolver address
//! - Registering the bet in the escrow contract and announcing it
//! - Routing to refund when the polling window expires or funds are
//!   collected but the sweep/create fails
//!
//! Explorer errors while polling are swallowed and treated as "not yet
//! deposited"; the external APIs are flaky and a partial outage must not
//! corrupt bet state.

use crate::capabilities::{
    BetArchive, BetRegistry, ChainExplorer, ChainWallet, CreateBetRequest, ExplorerError,
    RegistryError, SendRequest, SocialPlatform, WalletError,
};
use crate::config::LimitsConfig;
use crate::entities::bet::{Bet, BetRecord, resolver_path};
use crate::ledger::BetLedger;
use crate::utils::amounts::{self, SWEEP_GAS_LIMIT};
use kanau::processor::Processor;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Errors that route a funded bet to the refund queue.
#[derive(Debug, Error)]
pub enum DepositError {
    #[error("explorer error: {0}")]
    Explorer(#[from] ExplorerError),

    #[error("signer error: {0}")]
    Wallet(#[from] WalletError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("balance at {0} cannot cover the sweep gas fee")]
    Insufficient(String),

    /// Party addresses missing despite a full deposit; state was damaged.
    #[error("party addresses unknown for bet {0}")]
    PartiesUnknown(String),
}

/// DepositStage watches deposit addresses and moves funded bets on chain.
pub struct DepositStage {
    ledger: Arc<BetLedger>,
    explorer: Arc<dyn ChainExplorer>,
    wallet: Arc<dyn ChainWallet>,
    registry: Arc<dyn BetRegistry>,
    archive: Arc<dyn BetArchive>,
    social: Arc<dyn SocialPlatform>,
    bot_name: String,
    limits: LimitsConfig,
    delay: Duration,
}

impl DepositStage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<BetLedger>,
        explorer: Arc<dyn ChainExplorer>,
        wallet: Arc<dyn ChainWallet>,
        registry: Arc<dyn BetRegistry>,
        archive: Arc<dyn BetArchive>,
        social: Arc<dyn SocialPlatform>,
        bot_name: String,
        limits: LimitsConfig,
        delay: Duration,
    ) -> Self {
        Self {
            ledger,
            explorer,
            wallet,
            registry,
            archive,
            social,
            bot_name,
            limits,
            delay,
        }
    }

    /// Run the DepositStage until shutdown is signaled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("DepositStage started");

        loop {
            if super::sleep_or_shutdown(&mut shutdown_rx, self.delay).await {
                info!("DepositStage received shutdown signal");
                break;
            }
            if let Some(bet) = self.ledger.pop_deposit().await {
                let _ = self.process(bet).await;
            }
        }

        info!("DepositStage shutdown complete");
    }

    /// Check both deposit balances; when both cover the stake, recover the
    /// depositing senders. `None` means "not yet" (including when the
    /// explorer cannot name a sender yet).
    async fn check_deposits(&self, bet: &Bet) -> Result<Option<(String, String)>, ExplorerError> {
        let author_balance = self
            .explorer
            .native_balance(&bet.author_deposit_address, bet.chain)
            .await?;
        let opponent_balance = self
            .explorer
            .native_balance(&bet.opponent_deposit_address, bet.chain)
            .await?;

        if author_balance < bet.stake || opponent_balance < bet.stake {
            return Ok(None);
        }

        let Some(creator_tx) = self
            .explorer
            .latest_inbound(&bet.author_deposit_address, bet.chain)
            .await?
        else {
            return Ok(None);
        };
        let Some(opponent_tx) = self
            .explorer
            .latest_inbound(&bet.opponent_deposit_address, bet.chain)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some((creator_tx.sender, opponent_tx.sender)))
    }

    /// Sweep one deposit to the resolver: whole balance minus the
    /// worst-case gas fee and safety buffer.
    async fn sweep(
        &self,
        from: &str,
        path: &str,
        resolver: &str,
        chain: crate::entities::ChainTag,
    ) -> Result<(), DepositError> {
        let balance = self.explorer.native_balance(from, chain).await?;
        let fee = self.explorer.fee_estimate(chain).await?;
        let amount = amounts::sendable(balance, fee, SWEEP_GAS_LIMIT)
            .ok_or_else(|| DepositError::Insufficient(from.to_owned()))?;

        let receipt = self
            .wallet
            .send_native(SendRequest {
                path: path.to_owned(),
                from: from.to_owned(),
                to: resolver.to_owned(),
                value: amount,
                gas_limit: SWEEP_GAS_LIMIT,
                chain,
            })
            .await?;
        info!(from, resolver, amount, hash = %receipt.hash, "Swept deposit to resolver");
        Ok(())
    }

    /// Pool both deposits at the resolver address and register the bet.
    async fn pool_and_create(&self, bet: &mut Bet) -> Result<(), DepositError> {
        let path = resolver_path(&bet.id);
        let resolver = self.wallet.derive_address(&path, bet.chain).await?;
        bet.resolver_address = Some(resolver.clone());
        bet.bet_path = Some(path.clone());

        self.sweep(&bet.author_deposit_address, &bet.author_bet_path, &resolver, bet.chain)
            .await?;
        self.sweep(
            &bet.opponent_deposit_address,
            &bet.opponent_bet_path,
            &resolver,
            bet.chain,
        )
        .await?;

        let (Some(creator), Some(opponent)) =
            (bet.creator_address.clone(), bet.opponent_address.clone())
        else {
            return Err(DepositError::PartiesUnknown(bet.id.to_string()));
        };

        let created = self
            .registry
            .create_bet(CreateBetRequest {
                description: bet.description.clone(),
                creator,
                opponent,
                resolver,
                total_stake: bet.stake.saturating_mul(2),
                path,
                chain: bet.chain,
            })
            .await?;
        bet.bet_id = Some(created.bet_id);
        Ok(())
    }

    /// Announce the active bet in the thread. Best-effort: the bet is
    /// already on chain, so a failed announcement only loses visibility.
    async fn announce_created(&self, bet: &Bet) {
        let text = format!(
            "Bet created!\n\nBet between @{} and @{} is now active!\n\nTotal stake: {} ETH\n\nDescription: \"{}\"\n\nEither party can trigger settlement by tagging @{} with \"settle bet\"",
            bet.creator_username,
            bet.opponent_username,
            amounts::format_eth(bet.stake.saturating_mul(2)),
            bet.description,
            self.bot_name,
        );
        if let Err(e) = self.social.reply(&text, &bet.most_recent_post_id).await {
            warn!(bet = %bet.id, error = %e, "Failed to announce created bet");
        }
    }

    /// Persist bet metadata. Fire-and-forget.
    async fn archive_bet(&self, bet: &Bet) {
        let Some(record) = BetRecord::from_bet(bet) else {
            return;
        };
        if let Err(e) = self.archive.record_bet(&record).await {
            warn!(bet = %bet.id, error = %e, "Archive write failed");
        }
    }
}

impl Processor<Bet> for DepositStage {
    type Output = ();
    type Error = Infallible;

    async fn process(&self, mut bet: Bet) -> Result<(), Infallible> {
        if bet.deposit_attempt >= self.limits.max_deposit_attempts {
            warn!(
                bet = %bet.id,
                attempts = bet.deposit_attempt,
                "Deposit window expired, moving to refund"
            );
            self.ledger.push_refund(bet).await;
            return Ok(());
        }

        if !bet.total_deposited {
            match self.check_deposits(&bet).await {
                Ok(Some((creator, opponent))) => {
                    info!(bet = %bet.id, "Both parties have deposited");
                    bet.creator_address = Some(creator);
                    bet.opponent_address = Some(opponent);
                    bet.total_deposited = true;
                }
                Ok(None) => {}
                Err(e) => {
                    // Flaky explorer; same as not-yet-deposited.
                    warn!(bet = %bet.id, error = %e, "Balance check failed, will retry");
                }
            }
        }

        if bet.total_deposited {
            match self.pool_and_create(&mut bet).await {
                Ok(()) => {
                    info!(bet = %bet.id, bet_id = bet.bet_id, "Bet registered, awaiting settlement");
                    self.announce_created(&bet).await;
                    self.archive_bet(&bet).await;
                    self.ledger.push_settlement(bet).await;
                }
                Err(e) => {
                    // Funds are collected; never spin here.
                    error!(bet = %bet.id, error = %e, "Escrow setup failed, moving to refund");
                    self.ledger.push_refund(bet).await;
                }
            }
        } else {
            bet.deposit_attempt += 1;
            self.ledger.push_deposit(bet).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::fixtures::{
        StubArchive, StubExplorer, StubRegistry, StubSocial, StubWallet,
    };
    use crate::capabilities::{InboundKind, InboundTx};
    use crate::entities::ChainTag;
    use crate::entities::bet::deposit_path;
    use crate::utils::amounts::SAFETY_BUFFER_WEI;
    use std::sync::atomic::Ordering;

    const STAKE: u128 = 50_000_000_000_000_000;

    fn pending_bet() -> Bet {
        Bet {
            id: "100".into(),
            conversation_id: "90".into(),
            creator_username: "alice".into(),
            opponent_username: "bob".into(),
            description: "Y happens by Friday".to_owned(),
            stake: STAKE,
            chain: ChainTag::BaseSepolia,
            most_recent_post_id: "101".into(),
            author_bet_path: deposit_path("alice", "100"),
            author_deposit_address: "0xalice-100".to_owned(),
            opponent_bet_path: deposit_path("bob", "100"),
            opponent_deposit_address: "0xbob-100".to_owned(),
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
            created_at: 1000,
        }
    }

    struct Harness {
        ledger: Arc<BetLedger>,
        explorer: Arc<StubExplorer>,
        wallet: Arc<StubWallet>,
        registry: Arc<StubRegistry>,
        archive: Arc<StubArchive>,
        social: Arc<StubSocial>,
        stage: DepositStage,
    }

    fn harness() -> Harness {
        let ledger = Arc::new(BetLedger::new(0, 0));
        let explorer = Arc::new(StubExplorer::default());
        let wallet = Arc::new(StubWallet::default());
        let registry = Arc::new(StubRegistry::default());
        let archive = Arc::new(StubArchive::default());
        let social = Arc::new(StubSocial::default());
        let stage = DepositStage::new(
            ledger.clone(),
            explorer.clone(),
            wallet.clone(),
            registry.clone(),
            archive.clone(),
            social.clone(),
            "owes_bot".to_owned(),
            LimitsConfig::default(),
            Duration::from_secs(5),
        );
        Harness {
            ledger,
            explorer,
            wallet,
            registry,
            archive,
            social,
            stage,
        }
    }

    fn fund_both(h: &Harness, bet: &Bet) {
        h.explorer.set_balance(&bet.author_deposit_address, STAKE + SAFETY_BUFFER_WEI * 2);
        h.explorer.set_balance(&bet.opponent_deposit_address, STAKE + SAFETY_BUFFER_WEI * 2);
        h.explorer.set_inbound(
            &bet.author_deposit_address,
            InboundTx {
                sender: "0xcreator".to_owned(),
                kind: InboundKind::Normal,
            },
        );
        h.explorer.set_inbound(
            &bet.opponent_deposit_address,
            InboundTx {
                sender: "0xopponent".to_owned(),
                kind: InboundKind::Normal,
            },
        );
    }

    #[tokio::test]
    async fn unfunded_bet_is_requeued_with_bumped_attempt() {
        let h = harness();
        h.stage.process(pending_bet()).await.unwrap();

        let bet = h.ledger.pop_deposit().await.expect("requeued");
        assert_eq!(bet.deposit_attempt, 1);
        assert!(!bet.total_deposited);
        assert!(h.ledger.pop_refund().await.is_none());
    }

    #[tokio::test]
    async fn partially_funded_bet_keeps_polling() {
        let h = harness();
        let bet = pending_bet();
        h.explorer.set_balance(&bet.author_deposit_address, STAKE * 2);
        h.stage.process(bet).await.unwrap();

        let bet = h.ledger.pop_deposit().await.expect("requeued");
        assert!(!bet.total_deposited);
    }

    #[tokio::test]
    async fn funded_bet_is_swept_registered_and_queued_for_settlement() {
        let h = harness();
        let bet = pending_bet();
        fund_both(&h, &bet);
        h.stage.process(bet).await.unwrap();

        let bet = h.ledger.pop_settlement().await.expect("queued for settlement");
        assert_eq!(bet.bet_id, Some(1));
        assert!(bet.total_deposited);
        assert_eq!(bet.creator_address.as_deref(), Some("0xcreator"));
        assert_eq!(bet.opponent_address.as_deref(), Some("0xopponent"));
        assert_eq!(bet.bet_path.as_deref(), Some("resolver-100"));

        // Two sweeps to the resolver address, then one create call.
        let sends = h.wallet.sends.lock().unwrap();
        assert_eq!(sends.len(), 2);
        assert!(sends.iter().all(|s| s.to == "0xresolver-100"));
        drop(sends);

        let creates = h.registry.creates.lock().unwrap();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].total_stake, STAKE * 2);
        drop(creates);

        // Announcement and archive record went out.
        assert_eq!(h.social.sent_texts().len(), 1);
        assert!(h.social.sent_texts()[0].contains("Bet created!"));
        assert_eq!(h.archive.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_failure_routes_to_refund() {
        let h = harness();
        let bet = pending_bet();
        fund_both(&h, &bet);
        h.registry.fail_create.store(1, Ordering::SeqCst);
        h.stage.process(bet).await.unwrap();

        assert!(h.ledger.pop_settlement().await.is_none());
        let bet = h.ledger.pop_refund().await.expect("moved to refund");
        assert!(bet.bet_id.is_none());
    }

    #[tokio::test]
    async fn sweep_failure_routes_to_refund() {
        let h = harness();
        let bet = pending_bet();
        fund_both(&h, &bet);
        h.wallet.fail_sends.store(2, Ordering::SeqCst);
        h.stage.process(bet).await.unwrap();

        assert!(h.ledger.pop_settlement().await.is_none());
        assert!(h.ledger.pop_refund().await.is_some());
    }

    #[tokio::test]
    async fn expired_window_routes_to_refund() {
        let h = harness();
        let mut bet = pending_bet();
        bet.deposit_attempt = LimitsConfig::default().max_deposit_attempts;
        h.stage.process(bet).await.unwrap();

        assert!(h.ledger.pop_deposit().await.is_none());
        let bet = h.ledger.pop_refund().await.expect("moved to refund");
        assert_eq!(bet.deposit_attempt, 720);
    }
}
