//! Social-data provider client: fetch the recent posts of one account.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{NormalizedPost, PostAuthor, PostMetrics};
use crate::provider::model::{LastTweetsResp, WireTweet};

pub mod model;

const TWITTER_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider is not configured: {0}")]
    NotConfigured(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("rate limited by provider: {0}")]
    RateLimited(String),
    #[error("account @{0} not found")]
    NotFound(String),
    #[error("provider error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("parse error: {0}")]
    Parse(String),
}

#[async_trait]
pub trait PostProvider: Send + Sync {
    /// Fail fast when credentials are missing, before any I/O happens.
    fn ensure_ready(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Recent posts of `username`, newest first as the provider returns them.
    async fn fetch_recent_posts(&self, username: &str)
        -> Result<Vec<NormalizedPost>, ProviderError>;
}

#[derive(Clone)]
pub struct HttpProvider {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProvider")
            .field("base_url", &self.base_url)
            .field("has_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpProvider {
    pub fn from_config(cfg: &Config) -> Result<Self, ProviderError> {
        let base_url = Url::parse(&cfg.provider.base_url)
            .map_err(|e| ProviderError::NotConfigured(format!("invalid base_url: {e}")))?;
        Self::with_base_url(
            cfg.provider_api_key(),
            base_url,
            Duration::from_secs(cfg.provider.timeout_secs),
        )
    }

    pub fn with_base_url(
        api_key: Option<String>,
        base_url: Url,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .user_agent(concat!("x-watchbot/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    pub fn build_request(&self, username: &str) -> Result<reqwest::Request, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(missing_key)?;
        let mut endpoint = self
            .base_url
            .join("twitter/user/last_tweets")
            .map_err(|e| ProviderError::NotConfigured(format!("invalid base_url: {e}")))?;
        endpoint.query_pairs_mut().append_pair("userName", username);
        Ok(self
            .http
            .get(endpoint)
            .header("X-API-Key", api_key)
            .header("Accept", "application/json")
            .build()?)
    }
}

fn missing_key() -> ProviderError {
    ProviderError::NotConfigured(format!(
        "provider.api_key is empty and {} is not set",
        crate::config::PROVIDER_KEY_ENV
    ))
}

#[async_trait]
impl PostProvider for HttpProvider {
    fn ensure_ready(&self) -> Result<(), ProviderError> {
        self.api_key.as_ref().map(|_| ()).ok_or_else(missing_key)
    }

    async fn fetch_recent_posts(
        &self,
        username: &str,
    ) -> Result<Vec<NormalizedPost>, ProviderError> {
        let request = self.build_request(username)?;
        debug!(url = %request.url(), "provider request");
        let res = self.http.execute(request).await?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!(username, "rate limited by provider");
            return Err(ProviderError::RateLimited(body));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(username.to_string()));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = res.text().await?;
        let payload: LastTweetsResp =
            serde_json::from_str(&body).map_err(|e| ProviderError::Parse(e.to_string()))?;
        normalize_response(payload, username)
    }
}

/// Convert the provider envelope into normalized posts. One malformed post
/// fails the whole response so callers never see a partial success.
pub fn normalize_response(
    payload: LastTweetsResp,
    username: &str,
) -> Result<Vec<NormalizedPost>, ProviderError> {
    if payload.status.as_deref() == Some("error") {
        return Err(ProviderError::Api {
            status: StatusCode::OK.as_u16(),
            message: payload.msg.unwrap_or_else(|| "unknown provider error".into()),
        });
    }
    let tweets = payload
        .data
        .map(|d| d.tweets)
        .or(payload.tweets)
        .unwrap_or_default();
    tweets
        .into_iter()
        .map(|t| normalize_tweet(t, username))
        .collect()
}

fn normalize_tweet(tweet: WireTweet, fallback_username: &str) -> Result<NormalizedPost, ProviderError> {
    let raw_date = tweet
        .created_at
        .as_deref()
        .ok_or_else(|| ProviderError::Parse(format!("tweet {} has no createdAt", tweet.id)))?;
    let created_at = parse_created_at(raw_date)
        .ok_or_else(|| ProviderError::Parse(format!("tweet {} has bad createdAt {raw_date:?}", tweet.id)))?;
    let author = match tweet.author {
        Some(a) => PostAuthor {
            username: a.user_name.to_lowercase(),
            name: a.name,
        },
        None => PostAuthor {
            username: fallback_username.to_lowercase(),
            name: None,
        },
    };
    let quoted = match tweet.quoted_tweet {
        Some(q) => {
            // Quoted authors are unknown when absent; fall back to an empty handle.
            Some(Box::new(normalize_tweet(*q, "")?))
        }
        None => None,
    };
    Ok(NormalizedPost {
        id: tweet.id,
        text: tweet.text.unwrap_or_default(),
        author,
        created_at,
        lang: tweet.lang.filter(|l| !l.is_empty()),
        metrics: PostMetrics {
            likes: tweet.like_count.unwrap_or(0),
            retweets: tweet.retweet_count.unwrap_or(0),
            replies: tweet.reply_count.unwrap_or(0),
            quotes: tweet.quote_count.unwrap_or(0),
            views: tweet.view_count,
        },
        quoted,
    })
}

/// Accepts the classic Twitter format and RFC 3339.
pub fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, TWITTER_DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
