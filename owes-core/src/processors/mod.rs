//! Stage processors for the bet lifecycle.
//!
//! One processor per lifecycle queue, plus the discovery loop that feeds
//! the pipeline:
//!
//! - `ReplyStage`: parses challenge posts, derives deposit addresses,
//!   posts deposit instructions
//! - `DepositStage`: polls deposit balances, sweeps stakes to the
//!   resolver, registers the bet on chain
//! - `SettlementStage`: resolves triggered bets and pays the winner
//! - `RefundStage`: best-effort return of stranded deposits
//! - `DiscoveryLoop`: periodic platform search seeding new work
//!
//! Every processor is a supervised task: pop one item, advance it, sleep
//! a fixed delay, repeat, shutting down on the shared watch signal.
//! Capability failures become queue transitions, never task crashes.

pub mod deposits;
pub mod discovery;
pub mod orchestrator;
pub mod refunds;
pub mod reply;
pub mod settlements;

pub use deposits::DepositStage;
pub use discovery::DiscoveryLoop;
pub use orchestrator::{Orchestrator, StageDeps};
pub use refunds::RefundStage;
pub use reply::ReplyStage;
pub use settlements::SettlementStage;

use tokio::sync::watch;

/// Sleep for `delay`, returning `true` when shutdown was signaled
/// instead. Shared by every stage loop.
pub(crate) async fn sleep_or_shutdown(
    shutdown_rx: &mut watch::Receiver<bool>,
    delay: std::time::Duration,
) -> bool {
    tokio::select! {
        biased;

        changed = shutdown_rx.changed() => {
            changed.is_err() || *shutdown_rx.borrow()
        }

        _ = tokio::time::sleep(delay) => false,
    }
}
