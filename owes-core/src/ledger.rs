//! Shared bet queue state.
//!
//! `BetLedger` is the single owner of every lifecycle queue. Stage
//! processors and the discovery loop only mutate queue state through this
//! API, so concurrent producers (discovery and the deposit stage both push
//! to settlement) are serialized by construction and a work item is never
//! present in two queues at once.
//!
//! FIFO is preserved within each queue, with one exception: when a
//! settlement request is matched to a bet, that bet is spliced to the
//! front of the settlement queue so it is processed next.

use crate::entities::bet::Bet;
use crate::entities::post::Post;
use compact_str::CompactString;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct LedgerInner {
    pending_reply: VecDeque<Post>,
    pending_deposits: VecDeque<Bet>,
    pending_settlement: VecDeque<Bet>,
    pending_refund: VecDeque<Bet>,
    completed: Vec<Bet>,
    acknowledged: HashSet<CompactString>,
    bet_search_floor: i64,
    settle_search_floor: i64,
}

/// Mutex-guarded owner of the lifecycle queues.
pub struct BetLedger {
    inner: Mutex<LedgerInner>,
}

/// Point-in-time view of the ledger for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    pub pending_reply: Vec<Post>,
    pub pending_deposits: Vec<Bet>,
    pub pending_settlement: Vec<Bet>,
    pub pending_refund: Vec<Bet>,
    pub completed: Vec<Bet>,
    pub acknowledged_posts: usize,
    pub bet_search_floor: i64,
    pub settle_search_floor: i64,
}

impl BetLedger {
    /// Create an empty ledger with the given initial search floors
    /// (seconds since epoch; discovery ignores posts at or below a floor).
    pub fn new(bet_search_floor: i64, settle_search_floor: i64) -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                bet_search_floor,
                settle_search_floor,
                ..LedgerInner::default()
            }),
        }
    }

    /// Create an empty ledger with both search floors set to `backfill`
    /// before now. A fresh process only ingests posts from that window
    /// onward instead of replaying everything the search returns.
    pub fn seeded(backfill: Duration) -> Self {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let floor = now.saturating_sub(i64::try_from(backfill.as_secs()).unwrap_or(i64::MAX));
        Self::new(floor, floor)
    }

    // -- Reply queue --------------------------------------------------------

    pub async fn push_reply(&self, post: Post) {
        self.inner.lock().await.pending_reply.push_back(post);
    }

    pub async fn pop_reply(&self) -> Option<Post> {
        self.inner.lock().await.pending_reply.pop_front()
    }

    // -- Deposit queue ------------------------------------------------------

    pub async fn push_deposit(&self, bet: Bet) {
        self.inner.lock().await.pending_deposits.push_back(bet);
    }

    pub async fn pop_deposit(&self) -> Option<Bet> {
        self.inner.lock().await.pending_deposits.pop_front()
    }

    // -- Settlement queue ---------------------------------------------------

    pub async fn push_settlement(&self, bet: Bet) {
        self.inner.lock().await.pending_settlement.push_back(bet);
    }

    pub async fn pop_settlement(&self) -> Option<Bet> {
        self.inner.lock().await.pending_settlement.pop_front()
    }

    /// Match a settlement request to the most recently created queued bet
    /// involving `author`. On a match the trigger is attached, the
    /// settlement attempt counter resets, and the bet moves to the front
    /// of the queue. Returns `false` when no queued bet involves `author`.
    pub async fn attach_settlement_trigger(&self, author: &str, trigger: Post) -> bool {
        let mut inner = self.inner.lock().await;
        let found = inner
            .pending_settlement
            .iter()
            .enumerate()
            .filter(|(_, b)| b.involves(author))
            .max_by_key(|(_, b)| b.created_at)
            .map(|(i, _)| i);

        let Some(index) = found else {
            return false;
        };
        // remove cannot fail: the index came from the same locked view.
        let Some(mut bet) = inner.pending_settlement.remove(index) else {
            return false;
        };
        bet.settlement_trigger = Some(trigger);
        bet.settlement_attempt = 0;
        inner.pending_settlement.push_front(bet);
        true
    }

    // -- Refund queue and terminal store ------------------------------------

    pub async fn push_refund(&self, bet: Bet) {
        self.inner.lock().await.pending_refund.push_back(bet);
    }

    pub async fn pop_refund(&self) -> Option<Bet> {
        self.inner.lock().await.pending_refund.pop_front()
    }

    pub async fn complete(&self, bet: Bet) {
        self.inner.lock().await.completed.push(bet);
    }

    pub async fn completed_bets(&self) -> Vec<Bet> {
        self.inner.lock().await.completed.clone()
    }

    // -- Discovery bookkeeping ----------------------------------------------

    /// Mark a post as seen. Returns `false` if it was already acknowledged,
    /// so re-running discovery over the same posts creates no duplicates.
    pub async fn acknowledge(&self, post_id: &str) -> bool {
        self.inner.lock().await.acknowledged.insert(post_id.into())
    }

    pub async fn bet_search_floor(&self) -> i64 {
        self.inner.lock().await.bet_search_floor
    }

    /// Advance the bet-search floor. Never moves backwards.
    pub async fn advance_bet_search_floor(&self, ts: i64) {
        let mut inner = self.inner.lock().await;
        inner.bet_search_floor = inner.bet_search_floor.max(ts);
    }

    pub async fn settle_search_floor(&self) -> i64 {
        self.inner.lock().await.settle_search_floor
    }

    /// Advance the settle-search floor. Never moves backwards.
    pub async fn advance_settle_search_floor(&self, ts: i64) {
        let mut inner = self.inner.lock().await;
        inner.settle_search_floor = inner.settle_search_floor.max(ts);
    }

    // -- Observation --------------------------------------------------------

    pub async fn snapshot(&self) -> LedgerSnapshot {
        let inner = self.inner.lock().await;
        LedgerSnapshot {
            pending_reply: inner.pending_reply.iter().cloned().collect(),
            pending_deposits: inner.pending_deposits.iter().cloned().collect(),
            pending_settlement: inner.pending_settlement.iter().cloned().collect(),
            pending_refund: inner.pending_refund.iter().cloned().collect(),
            completed: inner.completed.clone(),
            acknowledged_posts: inner.acknowledged.len(),
            bet_search_floor: inner.bet_search_floor,
            settle_search_floor: inner.settle_search_floor,
        }
    }

    /// How many times `bet_id` appears across all queues and stores.
    /// Exposed for tests asserting the single-location invariant.
    #[cfg(test)]
    pub async fn occurrences(&self, bet_id: &str) -> usize {
        let inner = self.inner.lock().await;
        inner
            .pending_deposits
            .iter()
            .chain(inner.pending_settlement.iter())
            .chain(inner.pending_refund.iter())
            .chain(inner.completed.iter())
            .filter(|b| b.id == bet_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ChainTag;
    use crate::entities::bet::deposit_path;

    fn bet(id: &str, creator: &str, opponent: &str, created_at: i64) -> Bet {
        Bet {
            id: id.into(),
            conversation_id: id.into(),
            creator_username: creator.into(),
            opponent_username: opponent.into(),
            description: "terms".to_owned(),
            stake: 100,
            chain: ChainTag::BaseSepolia,
            most_recent_post_id: id.into(),
            author_bet_path: deposit_path(creator, id),
            author_deposit_address: format!("0xa-{id}"),
            opponent_bet_path: deposit_path(opponent, id),
            opponent_deposit_address: format!("0xb-{id}"),
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
            created_at,
        }
    }

    fn trigger(id: &str, author: &str) -> Post {
        Post {
            id: id.into(),
            text: "settle bet".to_owned(),
            author_username: author.into(),
            author_id: "42".into(),
            conversation_id: None,
            created_at: 0,
            reply_attempt: 0,
        }
    }

    #[tokio::test]
    async fn queues_are_fifo() {
        let ledger = BetLedger::new(0, 0);
        ledger.push_deposit(bet("1", "a", "b", 1)).await;
        ledger.push_deposit(bet("2", "a", "b", 2)).await;

        assert_eq!(ledger.pop_deposit().await.map(|b| b.id), Some("1".into()));
        assert_eq!(ledger.pop_deposit().await.map(|b| b.id), Some("2".into()));
        assert!(ledger.pop_deposit().await.is_none());
    }

    #[tokio::test]
    async fn acknowledge_is_idempotent() {
        let ledger = BetLedger::new(0, 0);
        assert!(ledger.acknowledge("p1").await);
        assert!(!ledger.acknowledge("p1").await);
        assert!(ledger.acknowledge("p2").await);
    }

    #[tokio::test]
    async fn trigger_match_promotes_most_recent_bet() {
        let ledger = BetLedger::new(0, 0);
        ledger.push_settlement(bet("old", "alice", "bob", 10)).await;
        ledger.push_settlement(bet("mid", "carol", "dave", 20)).await;
        ledger.push_settlement(bet("new", "alice", "eve", 30)).await;

        assert!(ledger.attach_settlement_trigger("Alice", trigger("t", "Alice")).await);

        let first = ledger.pop_settlement().await.unwrap();
        assert_eq!(first.id, "new");
        assert!(first.settlement_trigger.is_some());
        assert_eq!(first.settlement_attempt, 0);

        // The unmatched bets kept their order behind the promoted one.
        assert_eq!(ledger.pop_settlement().await.unwrap().id, "old");
        assert_eq!(ledger.pop_settlement().await.unwrap().id, "mid");
    }

    #[tokio::test]
    async fn trigger_without_matching_bet_is_reported() {
        let ledger = BetLedger::new(0, 0);
        ledger.push_settlement(bet("1", "alice", "bob", 10)).await;
        assert!(!ledger.attach_settlement_trigger("mallory", trigger("t", "mallory")).await);
        // Queue untouched.
        assert_eq!(ledger.pop_settlement().await.unwrap().id, "1");
    }

    #[tokio::test]
    async fn a_bet_lives_in_exactly_one_place() {
        let ledger = BetLedger::new(0, 0);
        ledger.push_deposit(bet("1", "a", "b", 1)).await;
        assert_eq!(ledger.occurrences("1").await, 1);

        let b = ledger.pop_deposit().await.unwrap();
        assert_eq!(ledger.occurrences("1").await, 0);

        ledger.push_settlement(b).await;
        assert_eq!(ledger.occurrences("1").await, 1);

        let b = ledger.pop_settlement().await.unwrap();
        ledger.complete(b).await;
        assert_eq!(ledger.occurrences("1").await, 1);
    }

    #[tokio::test]
    async fn seeded_floors_start_in_the_recent_past() {
        let before = time::OffsetDateTime::now_utc().unix_timestamp();
        let ledger = BetLedger::seeded(Duration::from_secs(100));
        let after = time::OffsetDateTime::now_utc().unix_timestamp();

        let floor = ledger.bet_search_floor().await;
        assert!(floor >= before - 100);
        assert!(floor <= after - 100);
        assert_eq!(ledger.settle_search_floor().await, floor);
    }

    #[tokio::test]
    async fn floors_never_move_backwards() {
        let ledger = BetLedger::new(100, 100);
        ledger.advance_bet_search_floor(50).await;
        assert_eq!(ledger.bet_search_floor().await, 100);
        ledger.advance_bet_search_floor(200).await;
        assert_eq!(ledger.bet_search_floor().await, 200);
    }
}
