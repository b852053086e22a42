// Keyword search via app.bsky.feed.searchPosts.
//
// One call per keyword per pass, limited to the pass's time window. The
// response's post views are decoded with atrium-api types; text and createdAt
// come from the embedded app.bsky.feed.post record.

use anyhow::{Context, Result};
use async_trait::async_trait;
use atrium_api::app::bsky::feed::search_posts;
use atrium_api::types::TryFromUnknown;
use tracing::{debug, warn};

use super::client::BlueskyClient;
use super::source::{PostSource, SearchQuery, SourcePost};

/// Timestamp format accepted by searchPosts' `since` / `until`.
const WINDOW_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[async_trait]
impl PostSource for BlueskyClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SourcePost>> {
        let limit = query.limit.min(100).to_string();
        let since = query.window.since.format(WINDOW_FORMAT).to_string();
        let until = query.window.until.format(WINDOW_FORMAT).to_string();

        let params: Vec<(&str, &str)> = vec![
            ("q", query.keyword.as_str()),
            ("limit", limit.as_str()),
            ("sort", "top"),
            ("since", since.as_str()),
            ("until", until.as_str()),
            ("lang", query.lang.as_str()),
        ];

        let output: search_posts::Output = self
            .xrpc_get("app.bsky.feed.searchPosts", &params)
            .await
            .with_context(|| format!("Failed to search posts for '{}'", query.keyword))?;

        let mut posts = Vec::with_capacity(output.posts.len());
        for post_view in &output.posts {
            // The record field is an untyped IPLD value: decode it into the
            // typed post::Record to reach the text and creation time.
            let record = match atrium_api::app::bsky::feed::post::Record::try_from_unknown(
                post_view.record.clone(),
            ) {
                Ok(record) => record,
                Err(e) => {
                    warn!(uri = %post_view.uri, error = %e, "Undecodable post record, skipping");
                    continue;
                }
            };

            posts.push(SourcePost {
                uri: post_view.uri.clone(),
                author_handle: post_view.author.handle.as_str().to_string(),
                text: record.data.text.clone(),
                created_at: record.data.created_at.as_str().to_string(),
            });
        }

        debug!(
            keyword = %query.keyword,
            count = posts.len(),
            "searchPosts returned posts"
        );

        Ok(posts)
    }

    fn canonical_link(&self, post: &SourcePost) -> Option<String> {
        at_uri_to_link(&post.uri)
    }
}

/// Convert `at://{did}/app.bsky.feed.post/{rkey}` into
/// `https://bsky.app/profile/{did}/post/{rkey}`.
pub fn at_uri_to_link(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("at://")?;
    let mut parts = rest.split('/');
    let did = parts.next().filter(|s| !s.is_empty())?;
    let collection = parts.next()?;
    let rkey = parts.next().filter(|s| !s.is_empty())?;
    if collection != "app.bsky.feed.post" || parts.next().is_some() {
        return None;
    }
    Some(format!("https://bsky.app/profile/{did}/post/{rkey}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_uri_to_link() {
        assert_eq!(
            at_uri_to_link("at://did:plc:abc123/app.bsky.feed.post/3kxyz"),
            Some("https://bsky.app/profile/did:plc:abc123/post/3kxyz".to_string())
        );
    }

    #[test]
    fn test_at_uri_to_link_rejects_malformed() {
        assert_eq!(at_uri_to_link("https://bsky.app/profile/x/post/y"), None);
        assert_eq!(at_uri_to_link("at://did:plc:abc123"), None);
        assert_eq!(at_uri_to_link("at://did:plc:abc123/app.bsky.feed.post/"), None);
        assert_eq!(at_uri_to_link("at://did:plc:abc/app.bsky.feed.repost/r1"), None);
        assert_eq!(at_uri_to_link("at://did:plc:abc/app.bsky.feed.post/r1/extra"), None);
    }

    #[test]
    fn test_search_output_deserializes() {
        let json = r#"{
            "posts": [{
                "uri": "at://did:plc:abc123/app.bsky.feed.post/3kxyz",
                "cid": "bafyreib2rxk3rybk3aobmv5cjuql3bm2twh4jo5uxgf5fk3ahwhzmibjay",
                "author": {"did": "did:plc:abc123", "handle": "reporter.bsky.social"},
                "record": {
                    "$type": "app.bsky.feed.post",
                    "text": "Flood hits Austin today!",
                    "createdAt": "2025-03-01T12:00:00.000Z"
                },
                "indexedAt": "2025-03-01T12:00:01.000Z"
            }]
        }"#;
        let output: search_posts::Output = serde_json::from_str(json).unwrap();
        assert_eq!(output.posts.len(), 1);
        let record = atrium_api::app::bsky::feed::post::Record::try_from_unknown(
            output.posts[0].record.clone(),
        )
        .unwrap();
        assert_eq!(record.data.text, "Flood hits Austin today!");
        assert_eq!(output.posts[0].author.handle.as_str(), "reporter.bsky.social");
    }
}
