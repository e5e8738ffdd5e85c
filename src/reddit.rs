//! Reddit source client — the fetch/reply collaborator.
//!
//! OAuth2 password grant with a cached token, `/new` listing fetch, and
//! comment dispatch. Non-fatal reply rejections (locked thread,
//! Reddit-side rate limit) surface as `Ok(false)`, not errors — the
//! pipeline treats any non-true result as a dispatch failure.
//!
//! A short fixed pause between raw HTTP requests throttles API volume
//! independently of the reply gate's own cooldown.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::pipeline::types::{RawPost, SourceClient};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
/// Minimum spacing between raw API requests.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(2);
/// Renew the token this long before Reddit's reported expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Script-app credentials for the password grant.
#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub username: String,
    pub password: SecretString,
    pub user_agent: String,
}

impl RedditCredentials {
    /// Read credentials from the environment. Returns `None` when any
    /// required variable is missing — the caller decides whether that
    /// is fatal.
    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var("REDDIT_CLIENT_ID").ok()?;
        let client_secret = std::env::var("REDDIT_CLIENT_SECRET").ok()?;
        let username = std::env::var("REDDIT_USERNAME").ok()?;
        let password = std::env::var("REDDIT_PASSWORD").ok()?;
        let user_agent =
            std::env::var("REDDIT_USER_AGENT").unwrap_or_else(|_| "replybot/0.1".to_string());
        Some(Self {
            client_id,
            client_secret: SecretString::from(client_secret),
            username,
            password: SecretString::from(password),
            user_agent,
        })
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Reddit API client.
pub struct RedditClient {
    http: reqwest::Client,
    credentials: RedditCredentials,
    token: Mutex<Option<CachedToken>>,
    last_request: Mutex<Option<Instant>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: RedditPostData,
}

#[derive(Debug, Deserialize)]
struct RedditPostData {
    id: String,
    title: String,
    #[serde(default)]
    selftext: String,
    author: Option<String>,
    subreddit: String,
    created_utc: f64,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: i64,
    #[serde(default)]
    is_self: bool,
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    json: CommentJson,
}

#[derive(Debug, Deserialize)]
struct CommentJson {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
}

impl RedditClient {
    pub fn new(credentials: RedditCredentials) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .user_agent(&credentials.user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SourceError::Http(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            credentials,
            token: Mutex::new(None),
            last_request: Mutex::new(None),
        })
    }

    /// Space out raw API requests.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                let wait = MIN_REQUEST_INTERVAL - elapsed;
                debug!(?wait, "Pacing Reddit API request");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Get a valid access token, refreshing through the password grant
    /// when the cached one is missing or near expiry.
    async fn access_token(&self) -> Result<String, SourceError> {
        let mut token = self.token.lock().await;
        if let Some(cached) = token.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let params = [
            ("grant_type", "password"),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.expose_secret()),
        ];
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(
                &self.credentials.client_id,
                Some(self.credentials.client_secret.expose_secret()),
            )
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SourceError::Auth {
                service: "reddit".to_string(),
                reason: format!("token request returned {status}: {detail}"),
            });
        }

        let parsed: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| SourceError::InvalidResponse {
                    service: "reddit".to_string(),
                    reason: format!("bad token response: {e}"),
                })?;

        let expires_at = Instant::now()
            + Duration::from_secs(parsed.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        let access_token = parsed.access_token.clone();
        *token = Some(CachedToken {
            access_token: parsed.access_token,
            expires_at,
        });
        info!(username = %self.credentials.username, "Authenticated with Reddit");
        Ok(access_token)
    }
}

fn map_post(data: RedditPostData) -> RawPost {
    RawPost {
        id: data.id,
        title: data.title,
        body: if data.is_self { data.selftext } else { String::new() },
        author: data.author.unwrap_or_else(|| "[deleted]".to_string()),
        source: data.subreddit,
        created_at: DateTime::from_timestamp(data.created_utc as i64, 0)
            .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC),
        score: data.score,
        num_comments: data.num_comments,
        is_self: data.is_self,
    }
}

/// Reply rejections Reddit reports in-band that should not be treated
/// as transport failures.
fn is_non_fatal_rejection(code: &str) -> bool {
    matches!(
        code,
        "THREAD_LOCKED" | "RATELIMIT" | "DELETED_LINK" | "TOO_OLD" | "SUBREDDIT_OUTBOUND_LINKING_DISALLOWED"
    )
}

#[async_trait]
impl SourceClient for RedditClient {
    async fn fetch_new_posts(
        &self,
        source: &str,
        limit: usize,
    ) -> Result<Vec<RawPost>, SourceError> {
        let token = self.access_token().await?;
        self.pace().await;

        let url = format!("{API_BASE}/r/{source}/new");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .query(&[("limit", limit.to_string())])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Token went stale early; drop it so the next call re-auths.
            self.token.lock().await.take();
            return Err(SourceError::Auth {
                service: "reddit".to_string(),
                reason: "access token rejected".to_string(),
            });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                service: "reddit".to_string(),
                status: status.as_u16(),
                message: detail,
            });
        }

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse {
                service: "reddit".to_string(),
                reason: format!("bad listing body: {e}"),
            })?;

        let posts: Vec<RawPost> = listing
            .data
            .children
            .into_iter()
            .map(|child| map_post(child.data))
            .collect();

        info!(source, count = posts.len(), "Fetched new posts");
        Ok(posts)
    }

    async fn post_reply(&self, post_id: &str, text: &str) -> Result<bool, SourceError> {
        let token = self.access_token().await?;
        self.pace().await;

        let thing_id = format!("t3_{post_id}");
        let params = [
            ("api_type", "json"),
            ("thing_id", thing_id.as_str()),
            ("text", text),
        ];
        let response = self
            .http
            .post(format!("{API_BASE}/api/comment"))
            .bearer_auth(&token)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                service: "reddit".to_string(),
                status: status.as_u16(),
                message: detail,
            });
        }

        let parsed: CommentResponse =
            response
                .json()
                .await
                .map_err(|e| SourceError::InvalidResponse {
                    service: "reddit".to_string(),
                    reason: format!("bad comment response: {e}"),
                })?;

        if let Some(first_error) = parsed.json.errors.first() {
            let code = first_error
                .first()
                .and_then(|v| v.as_str())
                .unwrap_or("UNKNOWN");
            if is_non_fatal_rejection(code) {
                warn!(post_id, code, "Reply rejected by Reddit");
            } else {
                warn!(post_id, code, "Reply failed with unexpected API error");
            }
            return Ok(false);
        }

        info!(post_id, "Reply posted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_maps_to_raw_posts() {
        let raw = r#"{
            "data": {
                "children": [{
                    "kind": "t3",
                    "data": {
                        "id": "abc123",
                        "title": "Visiting India next month",
                        "selftext": "Any tips?",
                        "author": "alice",
                        "subreddit": "travel",
                        "created_utc": 1767225600.0,
                        "score": 42,
                        "num_comments": 7,
                        "is_self": true
                    }
                }]
            }
        }"#;
        let listing: Listing = serde_json::from_str(raw).unwrap();
        let posts: Vec<RawPost> = listing
            .data
            .children
            .into_iter()
            .map(|c| map_post(c.data))
            .collect();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "abc123");
        assert_eq!(posts[0].body, "Any tips?");
        assert_eq!(posts[0].source, "travel");
        assert_eq!(posts[0].score, 42);
    }

    #[test]
    fn link_post_body_is_empty() {
        let data = RedditPostData {
            id: "x".into(),
            title: "A link".into(),
            selftext: "ignored".into(),
            author: Some("bob".into()),
            subreddit: "news".into(),
            created_utc: 1767225600.0,
            score: 1,
            num_comments: 0,
            is_self: false,
        };
        assert!(map_post(data).body.is_empty());
    }

    #[test]
    fn missing_author_becomes_deleted() {
        let data = RedditPostData {
            id: "x".into(),
            title: "t".into(),
            selftext: String::new(),
            author: None,
            subreddit: "s".into(),
            created_utc: 0.0,
            score: 0,
            num_comments: 0,
            is_self: true,
        };
        assert_eq!(map_post(data).author, "[deleted]");
    }

    #[test]
    fn comment_error_envelope_parses() {
        let raw = r#"{
            "json": {
                "errors": [["RATELIMIT", "you are doing that too much", "ratelimit"]]
            }
        }"#;
        let parsed: CommentResponse = serde_json::from_str(raw).unwrap();
        let code = parsed.json.errors[0][0].as_str().unwrap();
        assert!(is_non_fatal_rejection(code));
    }

    #[test]
    fn clean_comment_response_has_no_errors() {
        let raw = r#"{ "json": { "errors": [] } }"#;
        let parsed: CommentResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.json.errors.is_empty());
    }

    #[test]
    fn unexpected_rejection_codes_are_not_whitelisted() {
        assert!(!is_non_fatal_rejection("USER_REQUIRED"));
        assert!(is_non_fatal_rejection("THREAD_LOCKED"));
    }
}
