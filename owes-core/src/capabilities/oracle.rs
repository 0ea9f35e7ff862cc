//! AI oracle adapter over an agent-thread API.
//!
//! Both capabilities follow the same protocol: create a thread seeded with
//! a hello message and call metadata, run the configured agent with the
//! real message, then poll the thread until an assistant reply appears
//! (falling back to the newest assistant message in the thread state when
//! the run endpoint returns without one).
//!
//! The parser agent answers with a JSON bet intent or the literal marker
//! `INVALID`; the resolver agent answers free text whose meaning is binary:
//! a case-insensitive `true` means the stated terms held, so the creator
//! wins. That substring interpretation lives only here.

use super::{BetOracle, OracleError, ParseOutcome, ParsedBet, Ruling, Verdict};
use crate::entities::ChainTag;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

/// How long to wait for an assistant reply before giving up on a run.
const REPLY_DEADLINE: Duration = Duration::from_secs(25);
/// Poll cadence while waiting for the assistant reply.
const POLL_EVERY: Duration = Duration::from_secs(1);
/// How many thread messages to fetch in the fallback lookup.
const THREAD_STATE_LIMIT: u32 = 50;

/// Oracle adapter over an agent-thread HTTP API.
pub struct AgentOracle {
    http: reqwest::Client,
    base: Url,
    auth: String,
    parser_agent: String,
    resolver_agent: String,
}

#[derive(Debug, Serialize)]
struct CreateThreadRequest<'a> {
    message: &'a str,
    metadata: ThreadMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct ThreadMetadata<'a> {
    origin: &'a str,
    task: &'a str,
    trace_id: String,
}

#[derive(Debug, Deserialize)]
struct ThreadCreated {
    id: String,
}

#[derive(Debug, Serialize)]
struct RunAgentRequest<'a> {
    agent_id: &'a str,
    thread_id: &'a str,
    new_message: &'a str,
}

#[derive(Debug, Deserialize)]
struct ThreadState {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    text: Option<MessageText>,
}

#[derive(Debug, Deserialize)]
struct MessageText {
    value: String,
}

/// Wire shape of the parser agent's JSON answer.
#[derive(Debug, Deserialize)]
struct ParsedBetWire {
    opponent: String,
    amount: String,
    bet_terms: String,
    chain: Option<ChainTag>,
}

impl AgentOracle {
    pub fn new(base: Url, auth: String, parser_agent: String, resolver_agent: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base,
            auth,
            parser_agent,
            resolver_agent,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, OracleError> {
        self.base.join(path).map_err(|e| OracleError::Api {
            message: format!("invalid endpoint {path}: {e}"),
        })
    }

    /// Run `agent` against `message` and return the assistant's reply text.
    async fn ask_agent(&self, agent: &str, task: &str, message: &str) -> Result<String, OracleError> {
        let trace_id = Uuid::new_v4().to_string();
        let thread_id = self.create_thread(task, &trace_id).await?;
        debug!(agent, task, %trace_id, thread = %thread_id, "Running oracle agent");

        self.run_agent(agent, &thread_id, message).await?;
        self.await_assistant_reply(&thread_id).await
    }

    async fn create_thread(&self, task: &str, trace_id: &str) -> Result<String, OracleError> {
        let url = self.endpoint("v1/threads")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.auth)
            .json(&CreateThreadRequest {
                message: "Hello",
                metadata: ThreadMetadata {
                    origin: "owes",
                    task,
                    trace_id: trace_id.to_owned(),
                },
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(OracleError::Api {
                message: format!("thread creation returned {status}"),
            });
        }
        let created: ThreadCreated = response.json().await?;
        Ok(created.id)
    }

    async fn run_agent(&self, agent: &str, thread_id: &str, message: &str) -> Result<(), OracleError> {
        let url = self.endpoint("v1/agent/runs")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.auth)
            .json(&RunAgentRequest {
                agent_id: agent,
                thread_id,
                new_message: message,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(OracleError::Api {
                message: format!("agent run returned {status}"),
            });
        }
        Ok(())
    }

    /// Poll the thread until an assistant message appears, up to the
    /// deadline, then fall back to the newest assistant message in the
    /// thread state.
    async fn await_assistant_reply(&self, thread_id: &str) -> Result<String, OracleError> {
        let deadline = tokio::time::Instant::now() + REPLY_DEADLINE;
        loop {
            if let Some(text) = self.fetch_assistant_text(thread_id).await? {
                return Ok(text);
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(thread_id, "No assistant reply before the deadline");
                return Err(OracleError::Timeout);
            }
            tokio::time::sleep(POLL_EVERY).await;
        }
    }

    async fn fetch_assistant_text(&self, thread_id: &str) -> Result<Option<String>, OracleError> {
        let url = self.endpoint(&format!(
            "v1/threads/{thread_id}/messages?limit={THREAD_STATE_LIMIT}&order=desc"
        ))?;
        let response = self.http.get(url).bearer_auth(&self.auth).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(OracleError::Api {
                message: format!("thread state returned {status}"),
            });
        }
        let state: ThreadState = response.json().await?;
        // Newest first; take the first assistant message with text content.
        let text = state
            .data
            .iter()
            .filter(|m| m.role == "assistant")
            .find_map(|m| m.content.iter().find_map(|c| c.text.as_ref()))
            .map(|t| t.value.clone());
        Ok(text)
    }
}

/// Interpret the parser agent's answer. Failures to parse are user-error
/// territory, not transport errors, so they map to `Invalid`.
fn interpret_parse_reply(reply: &str) -> ParseOutcome {
    if reply.contains("INVALID") {
        return ParseOutcome::Invalid;
    }
    let Ok(wire) = serde_json::from_str::<ParsedBetWire>(reply) else {
        return ParseOutcome::Invalid;
    };
    // The agent reports amounts like "0.05 ETH"; take the numeric token.
    let amount_token = wire.amount.split_whitespace().next().unwrap_or_default();
    let Ok(amount) = Decimal::from_str(amount_token) else {
        return ParseOutcome::Invalid;
    };
    let opponent = wire.opponent.trim_start_matches('@');
    if opponent.is_empty() {
        return ParseOutcome::Invalid;
    }
    ParseOutcome::Bet(ParsedBet {
        opponent: opponent.into(),
        amount,
        terms: wire.bet_terms,
        chain: wire.chain,
    })
}

/// Interpret the resolver agent's free-text answer as a binary verdict.
fn interpret_resolution(reply: &str) -> Ruling {
    let verdict = if reply.to_lowercase().contains("true") {
        Verdict::CreatorWins
    } else {
        Verdict::OpponentWins
    };
    Ruling {
        verdict,
        rationale: reply.trim().to_owned(),
    }
}

#[async_trait]
impl BetOracle for AgentOracle {
    async fn parse_bet(&self, text: &str) -> Result<ParseOutcome, OracleError> {
        let reply = self.ask_agent(&self.parser_agent, "parse_bet", text).await?;
        Ok(interpret_parse_reply(&reply))
    }

    async fn resolve_outcome(&self, terms: &str) -> Result<Ruling, OracleError> {
        let reply = self
            .ask_agent(&self.resolver_agent, "resolve_outcome", terms)
            .await?;
        Ok(interpret_resolution(&reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_agent_reply() {
        let reply = r#"{"opponent": "@bob", "amount": "0.05 ETH", "bet_terms": "it rains by friday"}"#;
        let ParseOutcome::Bet(parsed) = interpret_parse_reply(reply) else {
            panic!("expected a parsed bet");
        };
        assert_eq!(parsed.opponent, "bob");
        assert_eq!(parsed.amount, Decimal::from_str("0.05").unwrap());
        assert_eq!(parsed.terms, "it rains by friday");
        assert_eq!(parsed.chain, None);
    }

    #[test]
    fn invalid_marker_and_garbage_map_to_invalid() {
        assert_eq!(interpret_parse_reply("INVALID"), ParseOutcome::Invalid);
        assert_eq!(
            interpret_parse_reply("Sorry, that is INVALID as a bet."),
            ParseOutcome::Invalid
        );
        assert_eq!(interpret_parse_reply("not even json"), ParseOutcome::Invalid);
        assert_eq!(
            interpret_parse_reply(r#"{"opponent": "", "amount": "1 ETH", "bet_terms": "x"}"#),
            ParseOutcome::Invalid
        );
    }

    #[test]
    fn chain_hint_is_passed_through() {
        let reply = r#"{"opponent": "bob", "amount": "1", "bet_terms": "x", "chain": "base"}"#;
        let ParseOutcome::Bet(parsed) = interpret_parse_reply(reply) else {
            panic!("expected a parsed bet");
        };
        assert_eq!(parsed.chain, Some(ChainTag::Base));
    }

    #[test]
    fn true_substring_means_creator_wins() {
        let ruling = interpret_resolution("The statement resolves to TRUE.");
        assert_eq!(ruling.verdict, Verdict::CreatorWins);

        let ruling = interpret_resolution("...resolves to FALSE...");
        assert_eq!(ruling.verdict, Verdict::OpponentWins);

        let ruling = interpret_resolution("inconclusive blather");
        assert_eq!(ruling.verdict, Verdict::OpponentWins);
    }
}
