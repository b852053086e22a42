// Bluesky XRPC client: unauthenticated by default, app-password session when configured.
//
// Post search is served by the public AppView without auth, but the AppView
// throttles anonymous search aggressively. With a handle and app password the
// client creates a session on the user's PDS and sends searches there with a
// bearer token instead.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Default public API endpoint for AT Protocol read operations.
pub const DEFAULT_PUBLIC_API_URL: &str = "https://public.api.bsky.app";

/// Default PDS used for `createSession` and authenticated reads.
pub const DEFAULT_PDS_URL: &str = "https://bsky.social";

struct Credentials {
    identifier: String,
    app_password: String,
}

/// Thin reqwest wrapper with a generic XRPC GET helper.
pub struct BlueskyClient {
    client: reqwest::Client,
    public_url: String,
    pds_url: String,
    credentials: Option<Credentials>,
    /// Access JWT of the current session, if any.
    access_token: RwLock<Option<String>>,
}

impl BlueskyClient {
    /// Create a client. No network traffic happens until the first request.
    pub fn new(public_url: &str, pds_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("disaster-watch/0.1 (disaster post monitoring)")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            public_url: public_url.trim_end_matches('/').to_string(),
            pds_url: pds_url.trim_end_matches('/').to_string(),
            credentials: None,
            access_token: RwLock::new(None),
        })
    }

    /// Use an app password for searches. Empty values leave the client anonymous.
    pub fn with_credentials(mut self, handle: &str, app_password: &str) -> Self {
        if !handle.is_empty() && !app_password.is_empty() {
            self.credentials = Some(Credentials {
                identifier: handle.to_string(),
                app_password: app_password.to_string(),
            });
        }
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Create a session with `com.atproto.server.createSession` and keep its
    /// access token for subsequent requests.
    pub async fn login(&self) -> Result<()> {
        let Some(creds) = &self.credentials else {
            anyhow::bail!("No Bluesky credentials configured");
        };

        let url = format!("{}/xrpc/com.atproto.server.createSession", self.pds_url);
        let response = self
            .client
            .post(&url)
            .json(&CreateSessionRequest {
                identifier: &creds.identifier,
                password: &creds.app_password,
            })
            .send()
            .await
            .context("createSession request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("createSession returned {status}: {body}");
        }

        let session: CreateSessionResponse = response
            .json()
            .await
            .context("Failed to parse createSession response")?;

        info!(handle = %session.handle, "Bluesky session created");
        *self.access_token.write().await = Some(session.access_jwt);
        Ok(())
    }

    /// Make a GET request to an XRPC endpoint and deserialize the response.
    ///
    /// With credentials configured, the first call logs in, and a 401 causes
    /// one fresh login and retry (access tokens expire after a few hours).
    pub async fn xrpc_get<T: DeserializeOwned>(
        &self,
        nsid: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        if self.credentials.is_some() && self.access_token.read().await.is_none() {
            if let Err(e) = self.login().await {
                warn!(error = %e, "Bluesky login failed, falling back to the public API");
            }
        }

        let mut response = self.send_get(nsid, params).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED && self.credentials.is_some() {
            debug!(nsid, "Session rejected, logging in again");
            *self.access_token.write().await = None;
            self.login().await?;
            response = self.send_get(nsid, params).await?;
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("XRPC {nsid} returned {status}: {body}");
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to deserialize {nsid} response"))
    }

    async fn send_get(&self, nsid: &str, params: &[(&str, &str)]) -> Result<reqwest::Response> {
        let token = self.access_token.read().await.clone();
        let base = if token.is_some() {
            &self.pds_url
        } else {
            &self.public_url
        };
        let url = format!("{base}/xrpc/{nsid}");

        debug!(nsid, authenticated = token.is_some(), "XRPC GET request");

        let mut request = self.client.get(&url).query(params);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .await
            .with_context(|| format!("XRPC request failed: {nsid}"))
    }
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    access_jwt: String,
    handle: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slashes_are_trimmed() {
        let client = BlueskyClient::new("https://public.api.bsky.app/", "https://bsky.social//")
            .unwrap();
        assert_eq!(client.public_url, "https://public.api.bsky.app");
        assert_eq!(client.pds_url, "https://bsky.social");
    }

    #[test]
    fn test_empty_credentials_stay_anonymous() {
        let client = BlueskyClient::new(DEFAULT_PUBLIC_API_URL, DEFAULT_PDS_URL)
            .unwrap()
            .with_credentials("", "");
        assert!(!client.has_credentials());

        let client = BlueskyClient::new(DEFAULT_PUBLIC_API_URL, DEFAULT_PDS_URL)
            .unwrap()
            .with_credentials("watcher.bsky.social", "abcd-efgh-ijkl-mnop");
        assert!(client.has_credentials());
    }

    #[test]
    fn test_create_session_response_parses() {
        let json = r#"{"accessJwt":"a.b.c","refreshJwt":"d.e.f","did":"did:plc:x","handle":"w.bsky.social"}"#;
        let resp: CreateSessionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.access_jwt, "a.b.c");
        assert_eq!(resp.handle, "w.bsky.social");
    }
}
