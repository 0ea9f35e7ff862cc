//! HTTP social platform adapter.
//!
//! Talks to a search/crosspost service: search returns recent posts for a
//! query, reply posts under an existing post. The `fake_reply` toggle
//! replaces outbound replies with a log line and a fabricated post id,
//! for dry runs against a live search feed.

use super::{SocialError, SocialPlatform};
use crate::config::ToggleStore;
use crate::entities::post::{Post, parse_created_at};
use async_trait::async_trait;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Page size requested from the search endpoint.
const SEARCH_PAGE_SIZE: u32 = 100;

/// Social platform adapter over a search + reply HTTP service.
pub struct HttpSocialPlatform {
    http: reqwest::Client,
    base: Url,
    bearer: String,
    toggles: ToggleStore,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(rename = "ExternalID")]
    external_id: String,
    #[serde(rename = "Content")]
    content: String,
    #[serde(rename = "Metadata")]
    metadata: SearchItemMetadata,
}

#[derive(Debug, Deserialize)]
struct SearchItemMetadata {
    username: Option<String>,
    user_id: Option<String>,
    conversation_id: Option<String>,
    created_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReplyRequest<'a> {
    text: &'a str,
    reply_to: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReplyResponse {
    id: String,
}

impl HttpSocialPlatform {
    pub fn new(base: Url, bearer: String, toggles: ToggleStore) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base,
            bearer,
            toggles,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, SocialError> {
        self.base.join(path).map_err(|e| SocialError::Api {
            message: format!("invalid endpoint {path}: {e}"),
        })
    }
}

#[async_trait]
impl SocialPlatform for HttpSocialPlatform {
    async fn search(&self, query: &str, since: i64) -> Result<Vec<Post>, SocialError> {
        let url = self.endpoint("search")?;
        debug!(query, since, "Searching posts");

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.bearer)
            .json(&SearchRequest {
                query,
                max_results: SEARCH_PAGE_SIZE,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SocialError::Api {
                message: format!("search returned {status}: {body}"),
            });
        }

        let parsed: SearchResponse = response.json().await?;
        let posts = parsed
            .results
            .into_iter()
            .map(|item| Post {
                id: item.external_id.into(),
                text: item.content,
                author_username: item
                    .metadata
                    .username
                    .map(CompactString::from)
                    .unwrap_or_else(|| CompactString::const_new("unknown_user")),
                author_id: item.metadata.user_id.map(CompactString::from).unwrap_or_default(),
                conversation_id: item.metadata.conversation_id.map(CompactString::from),
                created_at: parse_created_at(item.metadata.created_at.as_deref()),
                reply_attempt: 0,
            })
            .collect();
        Ok(posts)
    }

    async fn reply(&self, text: &str, reply_to: &str) -> Result<CompactString, SocialError> {
        if self.toggles.read().await.fake_reply {
            let fake_id = CompactString::from(format!("fake-{}", Uuid::new_v4()));
            info!(reply_to, fake_id = %fake_id, text, "fake_reply enabled, not posting");
            return Ok(fake_id);
        }

        let url = self.endpoint("reply")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.bearer)
            .json(&ReplyRequest { text, reply_to })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(reply_to, %status, "Reply rejected by platform");
            return Err(SocialError::Api {
                message: format!("reply returned {status}: {body}"),
            });
        }

        let parsed: ReplyResponse = response.json().await?;
        debug!(reply_to, new_post = %parsed.id, "Reply posted");
        Ok(parsed.id.into())
    }
}
