//! Scripted capability stand-ins for stage-processor tests.

use super::{
    ArchiveError, BetArchive, BetOracle, BetRegistry, ChainExplorer, ChainWallet,
    CreateBetRequest, CreatedBet, ExplorerError, InboundTx, OracleError, ParseOutcome,
    RegistryError, ResolveBetRequest, Ruling, SendRequest, SocialError, SocialPlatform,
    TxReceipt, WalletError,
};
use crate::entities::ChainTag;
use crate::entities::bet::BetRecord;
use crate::entities::post::Post;
use crate::utils::amounts::FeeEstimate;
use async_trait::async_trait;
use compact_str::CompactString;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Records outbound replies; optionally fails the first N of them.
#[derive(Default)]
pub struct StubSocial {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail_next_replies: AtomicU32,
    reply_counter: AtomicUsize,
    pub search_results: Mutex<Vec<Post>>,
}

#[async_trait]
impl SocialPlatform for StubSocial {
    async fn search(&self, _query: &str, _since: i64) -> Result<Vec<Post>, SocialError> {
        Ok(self.search_results.lock().unwrap().clone())
    }

    async fn reply(&self, text: &str, reply_to: &str) -> Result<CompactString, SocialError> {
        if self.fail_next_replies.load(Ordering::SeqCst) > 0 {
            self.fail_next_replies.fetch_sub(1, Ordering::SeqCst);
            return Err(SocialError::Api {
                message: "scripted failure".to_owned(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((text.to_owned(), reply_to.to_owned()));
        let n = self.reply_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("reply-{n}").into())
    }
}

impl StubSocial {
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }
}

/// Answers parsing and resolution with preset outcomes.
pub struct StubOracle {
    pub parse: ParseOutcome,
    pub ruling: Result<Ruling, String>,
}

impl Default for StubOracle {
    fn default() -> Self {
        Self {
            parse: ParseOutcome::Invalid,
            ruling: Err("unscripted".to_owned()),
        }
    }
}

#[async_trait]
impl BetOracle for StubOracle {
    async fn parse_bet(&self, _text: &str) -> Result<ParseOutcome, OracleError> {
        Ok(self.parse.clone())
    }

    async fn resolve_outcome(&self, _terms: &str) -> Result<Ruling, OracleError> {
        self.ruling
            .clone()
            .map_err(|message| OracleError::Api { message })
    }
}

/// Serves balances and inbound senders from in-memory maps.
#[derive(Default)]
pub struct StubExplorer {
    pub balances: Mutex<HashMap<String, u128>>,
    pub inbound: Mutex<HashMap<String, InboundTx>>,
}

impl StubExplorer {
    pub fn set_balance(&self, address: &str, wei: u128) {
        self.balances.lock().unwrap().insert(address.to_owned(), wei);
    }

    pub fn set_inbound(&self, address: &str, tx: InboundTx) {
        self.inbound.lock().unwrap().insert(address.to_owned(), tx);
    }
}

#[async_trait]
impl ChainExplorer for StubExplorer {
    async fn native_balance(&self, address: &str, _chain: ChainTag) -> Result<u128, ExplorerError> {
        Ok(*self.balances.lock().unwrap().get(address).unwrap_or(&0))
    }

    async fn latest_inbound(
        &self,
        address: &str,
        _chain: ChainTag,
    ) -> Result<Option<InboundTx>, ExplorerError> {
        Ok(self.inbound.lock().unwrap().get(address).cloned())
    }

    async fn fee_estimate(&self, _chain: ChainTag) -> Result<FeeEstimate, ExplorerError> {
        Ok(FeeEstimate {
            max_fee_per_gas: 100,
            max_priority_fee_per_gas: 10,
        })
    }
}

/// Derives predictable addresses and records sends.
#[derive(Default)]
pub struct StubWallet {
    pub sends: Mutex<Vec<SendRequest>>,
    pub fail_sends: AtomicU32,
}

#[async_trait]
impl ChainWallet for StubWallet {
    async fn derive_address(&self, path: &str, _chain: ChainTag) -> Result<String, WalletError> {
        Ok(format!("0x{path}"))
    }

    async fn send_native(&self, request: SendRequest) -> Result<TxReceipt, WalletError> {
        if self.fail_sends.load(Ordering::SeqCst) > 0 {
            self.fail_sends.fetch_sub(1, Ordering::SeqCst);
            return Err(WalletError::Api {
                message: "scripted failure".to_owned(),
            });
        }
        let hash = format!("0xsend{}", self.sends.lock().unwrap().len());
        self.sends.lock().unwrap().push(request);
        Ok(TxReceipt {
            explorer_link: format!("https://example.invalid/tx/{hash}"),
            hash,
        })
    }
}

/// Scripted escrow registry.
#[derive(Default)]
pub struct StubRegistry {
    pub creates: Mutex<Vec<CreateBetRequest>>,
    pub resolves: Mutex<Vec<ResolveBetRequest>>,
    pub fail_create: AtomicU32,
    pub fail_resolve_always: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl BetRegistry for StubRegistry {
    async fn create_bet(&self, request: CreateBetRequest) -> Result<CreatedBet, RegistryError> {
        if self.fail_create.load(Ordering::SeqCst) > 0 {
            self.fail_create.fetch_sub(1, Ordering::SeqCst);
            return Err(RegistryError::Api {
                message: "scripted failure".to_owned(),
            });
        }
        let bet_id = self.creates.lock().unwrap().len() as u64 + 1;
        self.creates.lock().unwrap().push(request);
        Ok(CreatedBet {
            bet_id,
            explorer_link: format!("https://example.invalid/tx/create-{bet_id}"),
        })
    }

    async fn resolve_bet(&self, request: ResolveBetRequest) -> Result<String, RegistryError> {
        if self.fail_resolve_always.load(Ordering::SeqCst) {
            return Err(RegistryError::Api {
                message: "scripted failure".to_owned(),
            });
        }
        let link = format!("https://example.invalid/tx/resolve-{}", request.bet_id);
        self.resolves.lock().unwrap().push(request);
        Ok(link)
    }
}

/// Records archive writes.
#[derive(Default)]
pub struct StubArchive {
    pub records: Mutex<Vec<BetRecord>>,
}

#[async_trait]
impl BetArchive for StubArchive {
    async fn record_bet(&self, record: &BetRecord) -> Result<(), ArchiveError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
