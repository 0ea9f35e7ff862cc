//! DiscoveryLoop processor.
//!
//! The DiscoveryLoop is responsible for:
//! - Periodically searching the social platform for new bet challenges
//!   and settlement requests, as two phases per cycle
//! - De-duplicating results against the acknowledged-post set so a post
//!   is only ever ingested once
//! - Feeding new challenges to the reply queue and matching settlement
//!   requests to their pending bet
//!
//! Search floors advance to the newest post seen, so a restarted search
//! never re-fetches history it already walked through.

use crate::capabilities::SocialPlatform;
use crate::config::{BotIdentity, ToggleStore};
use crate::entities::post::Post;
use crate::ledger::BetLedger;
use itertools::Itertools;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// DiscoveryLoop ingests bet challenges and settlement requests.
pub struct DiscoveryLoop {
    ledger: Arc<BetLedger>,
    social: Arc<dyn SocialPlatform>,
    identity: BotIdentity,
    toggles: ToggleStore,
    interval: Duration,
    settle_gap: Duration,
}

impl DiscoveryLoop {
    pub fn new(
        ledger: Arc<BetLedger>,
        social: Arc<dyn SocialPlatform>,
        identity: BotIdentity,
        toggles: ToggleStore,
        interval: Duration,
        settle_gap: Duration,
    ) -> Self {
        Self {
            ledger,
            social,
            identity,
            toggles,
            interval,
            settle_gap,
        }
    }

    /// Run the DiscoveryLoop until shutdown is signaled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("DiscoveryLoop started");

        loop {
            self.bet_search_cycle().await;
            if super::sleep_or_shutdown(&mut shutdown_rx, self.settle_gap).await {
                info!("DiscoveryLoop received shutdown signal");
                break;
            }
            self.settle_search_cycle().await;
            if super::sleep_or_shutdown(&mut shutdown_rx, self.interval).await {
                info!("DiscoveryLoop received shutdown signal");
                break;
            }
        }

        info!("DiscoveryLoop shutdown complete");
    }

    /// Posts by the bot itself never count as work.
    fn is_own_post(&self, post: &Post) -> bool {
        post.author_id == self.identity.platform_id
            || post.author_username.eq_ignore_ascii_case(&self.identity.name)
    }

    async fn fetch_new(&self, query: &str, floor: i64) -> Vec<Post> {
        let posts = match self.social.search(query, floor).await {
            Ok(posts) => posts,
            Err(e) => {
                warn!(query, error = %e, "Search failed, retrying next cycle");
                return Vec::new();
            }
        };
        let mut fresh = Vec::new();
        for post in posts
            .into_iter()
            .unique_by(|p| p.id.clone())
            .filter(|p| p.created_at > floor)
        {
            if self.is_own_post(&post) {
                continue;
            }
            if self.ledger.acknowledge(&post.id).await {
                fresh.push(post);
            }
        }
        fresh
    }

    /// Search for new bet challenges and queue them for reply.
    pub async fn bet_search_cycle(&self) {
        let floor = self.ledger.bet_search_floor().await;
        let posts = self.fetch_new(&self.identity.bet_query, floor).await;
        if posts.is_empty() {
            debug!("No new bet challenges");
            return;
        }

        let newest = posts.iter().map(|p| p.created_at).max().unwrap_or(floor);
        let search_only = self.toggles.read().await.search_only;
        info!(count = posts.len(), search_only, "Found new bet challenges");

        for post in posts {
            if search_only {
                info!(post = %post.id, author = %post.author_username, text = %post.text, "Search-only: skipping");
            } else {
                self.ledger.push_reply(post).await;
            }
        }
        self.ledger.advance_bet_search_floor(newest).await;
    }

    /// Search for settlement requests and attach each to its bet.
    pub async fn settle_search_cycle(&self) {
        let floor = self.ledger.settle_search_floor().await;
        let posts = self.fetch_new(&self.identity.settle_query, floor).await;
        if posts.is_empty() {
            debug!("No new settlement requests");
            return;
        }

        let newest = posts.iter().map(|p| p.created_at).max().unwrap_or(floor);
        let search_only = self.toggles.read().await.search_only;
        info!(count = posts.len(), "Found settlement requests");

        for post in posts {
            let author = post.author_username.clone();
            let post_id = post.id.clone();
            if self.ledger.attach_settlement_trigger(&author, post).await {
                info!(post = %post_id, author = %author, "Settlement request matched to a bet");
            } else if search_only {
                info!(post = %post_id, author = %author, "Search-only: skipping settlement apology");
            } else {
                debug!(post = %post_id, author = %author, "No pending bet for settlement request");
                let text =
                    format!("Sorry @{author}, I couldn't find an active bet to settle.");
                if let Err(e) = self.social.reply(&text, &post_id).await {
                    warn!(post = %post_id, error = %e, "Failed to send settlement apology");
                }
            }
        }
        self.ledger.advance_settle_search_floor(newest).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::fixtures::StubSocial;
    use crate::config::Toggles;
    use crate::entities::ChainTag;
    use crate::entities::bet::{Bet, deposit_path};

    fn identity() -> BotIdentity {
        BotIdentity {
            name: "betbot".to_owned(),
            platform_id: "99".to_owned(),
            signer_account: "betbot.testnet".to_owned(),
            bet_query: "@betbot bet".to_owned(),
            settle_query: "@betbot settle bet".to_owned(),
            default_chain: ChainTag::BaseSepolia,
        }
    }

    fn post(id: &str, author: &str, author_id: &str, created_at: i64) -> Post {
        Post {
            id: id.into(),
            text: format!("@betbot some text from {author}"),
            author_username: author.into(),
            author_id: author_id.into(),
            conversation_id: None,
            created_at,
            reply_attempt: 0,
        }
    }

    fn pending_bet(creator: &str) -> Bet {
        Bet {
            id: "100".into(),
            conversation_id: "90".into(),
            creator_username: creator.into(),
            opponent_username: "bob".into(),
            description: "it rains".to_owned(),
            stake: 100,
            chain: ChainTag::BaseSepolia,
            most_recent_post_id: "101".into(),
            author_bet_path: deposit_path(creator, "100"),
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
            created_at: 1000,
        }
    }

    struct Harness {
        ledger: Arc<BetLedger>,
        social: Arc<StubSocial>,
        discovery: DiscoveryLoop,
    }

    fn harness(toggles: Toggles) -> Harness {
        let ledger = Arc::new(BetLedger::new(0, 0));
        let social = Arc::new(StubSocial::default());
        let discovery = DiscoveryLoop::new(
            ledger.clone(),
            social.clone(),
            identity(),
            ToggleStore::new(toggles),
            Duration::from_secs(300),
            Duration::from_secs(60),
        );
        Harness {
            ledger,
            social,
            discovery,
        }
    }

    #[tokio::test]
    async fn new_challenges_are_queued_once() {
        let h = harness(Toggles::default());
        *h.social.search_results.lock().unwrap() = vec![
            post("1", "alice", "1", 100),
            post("1", "alice", "1", 100),
            post("2", "carol", "2", 150),
        ];

        h.discovery.bet_search_cycle().await;
        assert!(h.ledger.pop_reply().await.is_some());
        assert!(h.ledger.pop_reply().await.is_some());
        assert!(h.ledger.pop_reply().await.is_none());
        assert_eq!(h.ledger.bet_search_floor().await, 150);

        // The same results come back next cycle; nothing is re-ingested.
        h.discovery.bet_search_cycle().await;
        assert!(h.ledger.pop_reply().await.is_none());
    }

    #[tokio::test]
    async fn history_behind_the_floor_is_not_replayed() {
        let h = harness(Toggles::default());
        h.ledger.advance_bet_search_floor(1000).await;
        *h.social.search_results.lock().unwrap() = vec![
            post("1", "alice", "1", 500),
            post("2", "carol", "2", 1500),
        ];

        h.discovery.bet_search_cycle().await;

        let queued = h.ledger.pop_reply().await.expect("post above the floor");
        assert_eq!(queued.id, "2");
        assert!(h.ledger.pop_reply().await.is_none());
        assert_eq!(h.ledger.bet_search_floor().await, 1500);
    }

    #[tokio::test]
    async fn own_posts_are_ignored() {
        let h = harness(Toggles::default());
        *h.social.search_results.lock().unwrap() = vec![
            post("1", "betbot", "99", 100),
            post("2", "BetBot", "42", 110),
        ];

        h.discovery.bet_search_cycle().await;
        assert!(h.ledger.pop_reply().await.is_none());
    }

    #[tokio::test]
    async fn search_only_mode_logs_without_queueing() {
        let h = harness(Toggles {
            search_only: true,
            ..Default::default()
        });
        *h.social.search_results.lock().unwrap() = vec![post("1", "alice", "1", 100)];

        h.discovery.bet_search_cycle().await;
        assert!(h.ledger.pop_reply().await.is_none());
        assert_eq!(h.ledger.bet_search_floor().await, 100);
    }

    #[tokio::test]
    async fn settlement_request_promotes_the_matching_bet() {
        let h = harness(Toggles::default());
        h.ledger.push_settlement(pending_bet("alice")).await;
        *h.social.search_results.lock().unwrap() =
            vec![post("200", "alice", "1", 2000)];

        h.discovery.settle_search_cycle().await;

        let bet = h.ledger.pop_settlement().await.expect("still pending");
        let trigger = bet.settlement_trigger.expect("trigger attached");
        assert_eq!(trigger.id, "200");
        assert!(h.social.sent_texts().is_empty());
    }

    #[tokio::test]
    async fn unmatched_settlement_request_gets_an_apology() {
        let h = harness(Toggles::default());
        *h.social.search_results.lock().unwrap() =
            vec![post("200", "mallory", "7", 2000)];

        h.discovery.settle_search_cycle().await;

        let texts = h.social.sent_texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("@mallory"));
        assert_eq!(h.ledger.settle_search_floor().await, 2000);
    }
}
