use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A post observed on the social platform.
///
/// Immutable once observed, except for the reply bookkeeping counter used
/// while the post waits in the reply queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Platform id of the post.
    pub id: CompactString,
    /// Full post text.
    pub text: String,
    /// Handle of the author, without the leading `@`.
    pub author_username: CompactString,
    /// Platform id of the author's account.
    pub author_id: CompactString,
    /// Conversation/thread id, when the platform reports one.
    pub conversation_id: Option<CompactString>,
    /// Creation time, seconds since epoch.
    pub created_at: i64,
    /// How many times a reply to this post has been attempted.
    #[serde(default)]
    pub reply_attempt: u32,
}

/// Parse the RFC 3339 creation timestamp reported by search adapters.
///
/// Falls back to `now` when the platform omits or mangles the field, so a
/// post with a broken timestamp is still processed rather than dropped.
pub fn parse_created_at(raw: Option<&str>) -> i64 {
    raw.and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
        .map(|t| t.unix_timestamp())
        .unwrap_or_else(|| OffsetDateTime::now_utc().unix_timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_timestamps() {
        let ts = parse_created_at(Some("2025-03-01T12:00:00Z"));
        assert_eq!(ts, 1740830400);
    }

    #[test]
    fn missing_timestamp_falls_back_to_now() {
        let before = OffsetDateTime::now_utc().unix_timestamp();
        let ts = parse_created_at(None);
        assert!(ts >= before);
    }

    #[test]
    fn garbage_timestamp_falls_back_to_now() {
        let before = OffsetDateTime::now_utc().unix_timestamp();
        let ts = parse_created_at(Some("yesterday-ish"));
        assert!(ts >= before);
    }
}
