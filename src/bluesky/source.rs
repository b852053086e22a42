// Post source abstraction: what the ingestion cycle needs from a search backend.
//
// BlueskyClient is the production implementation. Tests script their own
// sources, so the ingestion cycle never knows which one it is talking to.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// The time window for one keyword query. Recomputed every pass as
/// `now - lookback .. now`; nothing about it is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl SearchWindow {
    pub fn ending_at(until: DateTime<Utc>, lookback: Duration) -> Self {
        Self {
            since: until - lookback,
            until,
        }
    }

    pub fn ending_now(lookback: Duration) -> Self {
        Self::ending_at(Utc::now(), lookback)
    }
}

/// One keyword search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub keyword: String,
    pub limit: u32,
    pub window: SearchWindow,
    /// Language filter, e.g. "en".
    pub lang: String,
}

/// A post as returned by the source, before any enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePost {
    /// Source-unique identifier the canonical link is built from
    /// (an `at://` URI for Bluesky).
    pub uri: String,
    pub author_handle: String,
    pub text: String,
    /// Creation time as the source reported it, kept verbatim.
    pub created_at: String,
}

#[async_trait]
pub trait PostSource: Send + Sync {
    /// Run one search. Errors are transient from the caller's point of view:
    /// network failures, rate limits, bad responses.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SourcePost>>;

    /// Turn a post's identifier into the canonical link used for dedup.
    /// `None` means the identifier is malformed and the post is skipped.
    fn canonical_link(&self, post: &SourcePost) -> Option<String>;
}
