//! Orchestrator.
//!
//! The Orchestrator is responsible for:
//! - Spawning one task per stage processor plus the discovery loop,
//!   exactly once (a second start request is a no-op)
//! - Fanning a shared shutdown signal out to every stage and waiting for
//!   all of them to drain
//! - Supporting restart, which is a full shutdown followed by a fresh
//!   spawn against the same ledger
//!
//! The ledger outlives any one generation of tasks, so a restart keeps
//! every pending bet in place.

use crate::capabilities::{BetArchive, BetOracle, BetRegistry, ChainExplorer, ChainWallet, SocialPlatform};
use crate::config::{OrchestratorConfig, ToggleStore};
use crate::ledger::BetLedger;
use crate::processors::{DepositStage, DiscoveryLoop, RefundStage, ReplyStage, SettlementStage};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Everything the stage processors need, bundled for spawning.
#[derive(Clone)]
pub struct StageDeps {
    pub ledger: Arc<BetLedger>,
    pub social: Arc<dyn SocialPlatform>,
    pub oracle: Arc<dyn BetOracle>,
    pub explorer: Arc<dyn ChainExplorer>,
    pub wallet: Arc<dyn ChainWallet>,
    pub registry: Arc<dyn BetRegistry>,
    pub archive: Arc<dyn BetArchive>,
    pub toggles: ToggleStore,
    pub config: OrchestratorConfig,
}

struct Running {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// Orchestrator owns the lifecycle of the stage tasks.
pub struct Orchestrator {
    deps: StageDeps,
    running: Mutex<Option<Running>>,
}

impl Orchestrator {
    pub fn new(deps: StageDeps) -> Self {
        Self {
            deps,
            running: Mutex::new(None),
        }
    }

    pub fn ledger(&self) -> &Arc<BetLedger> {
        &self.deps.ledger
    }

    /// Spawn all stage tasks. Returns `false` if they are already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("Start requested while already running");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let d = &self.deps;
        let timing = d.config.timing;

        let reply = ReplyStage::new(
            d.ledger.clone(),
            d.social.clone(),
            d.oracle.clone(),
            d.wallet.clone(),
            d.config.identity.clone(),
            d.config.limits,
            timing.reply_delay,
        );
        let deposits = DepositStage::new(
            d.ledger.clone(),
            d.explorer.clone(),
            d.wallet.clone(),
            d.registry.clone(),
            d.archive.clone(),
            d.social.clone(),
            d.config.identity.name.clone(),
            d.config.limits,
            timing.deposit_delay,
        );
        let settlements = SettlementStage::new(
            d.ledger.clone(),
            d.oracle.clone(),
            d.registry.clone(),
            d.social.clone(),
            d.config.limits,
            timing.settlement_delay,
        );
        let refunds = RefundStage::new(
            d.ledger.clone(),
            d.explorer.clone(),
            d.wallet.clone(),
            d.toggles.clone(),
            timing.refund_delay,
        );
        let discovery = DiscoveryLoop::new(
            d.ledger.clone(),
            d.social.clone(),
            d.config.identity.clone(),
            d.toggles.clone(),
            timing.polling_interval,
            timing.settle_search_gap,
        );

        let handles = vec![
            tokio::spawn(reply.run(shutdown_rx.clone())),
            tokio::spawn(deposits.run(shutdown_rx.clone())),
            tokio::spawn(settlements.run(shutdown_rx.clone())),
            tokio::spawn(refunds.run(shutdown_rx.clone())),
            tokio::spawn(discovery.run(shutdown_rx)),
        ];

        info!(tasks = handles.len(), "Orchestrator started");
        *running = Some(Running {
            shutdown_tx,
            handles,
        });
        true
    }

    /// Signal every stage to stop and wait for them to drain. Returns
    /// `false` if nothing was running.
    pub async fn shutdown(&self) -> bool {
        let Some(current) = self.running.lock().await.take() else {
            return false;
        };

        info!("Orchestrator shutting down");
        // Stages only observe the flag at their next loop turn; failure
        // means every receiver is already gone.
        let _ = current.shutdown_tx.send(true);
        futures_util::future::join_all(current.handles).await;
        info!("Orchestrator shutdown complete");
        true
    }

    /// Shut down (if running) and start a fresh generation of tasks.
    pub async fn restart(&self) {
        self.shutdown().await;
        self.start().await;
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::fixtures::{
        StubArchive, StubExplorer, StubOracle, StubRegistry, StubSocial, StubWallet,
    };
    use crate::config::{BotIdentity, LimitsConfig, TimingConfig, Toggles};
    use crate::entities::ChainTag;

    fn deps() -> StageDeps {
        StageDeps {
            ledger: Arc::new(BetLedger::new(0, 0)),
            social: Arc::new(StubSocial::default()),
            oracle: Arc::new(StubOracle::default()),
            explorer: Arc::new(StubExplorer::default()),
            wallet: Arc::new(StubWallet::default()),
            registry: Arc::new(StubRegistry::default()),
            archive: Arc::new(StubArchive::default()),
            toggles: ToggleStore::new(Toggles::default()),
            config: OrchestratorConfig {
                identity: BotIdentity {
                    name: "betbot".to_owned(),
                    platform_id: "99".to_owned(),
                    signer_account: "betbot.testnet".to_owned(),
                    bet_query: "@betbot bet".to_owned(),
                    settle_query: "@betbot settle bet".to_owned(),
                    default_chain: ChainTag::BaseSepolia,
                },
                timing: TimingConfig::default(),
                limits: LimitsConfig::default(),
            },
        }
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let orchestrator = Orchestrator::new(deps());
        assert!(orchestrator.start().await);
        assert!(!orchestrator.start().await);
        assert!(orchestrator.is_running().await);
        assert!(orchestrator.shutdown().await);
    }

    #[tokio::test]
    async fn shutdown_without_start_is_a_no_op() {
        let orchestrator = Orchestrator::new(deps());
        assert!(!orchestrator.shutdown().await);
        assert!(!orchestrator.is_running().await);
    }

    #[tokio::test]
    async fn shutdown_joins_every_stage() {
        let orchestrator = Orchestrator::new(deps());
        orchestrator.start().await;
        assert!(orchestrator.shutdown().await);
        assert!(!orchestrator.is_running().await);
    }

    #[tokio::test]
    async fn restart_spawns_a_fresh_generation() {
        let orchestrator = Orchestrator::new(deps());
        orchestrator.start().await;
        orchestrator.restart().await;
        assert!(orchestrator.is_running().await);
        orchestrator.shutdown().await;
    }
}
