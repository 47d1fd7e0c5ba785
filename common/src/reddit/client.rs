// Reddit API client: password-grant OAuth plus the "new posts" listing

use crate::credentials::RedditCredentials;
use crate::errors::FetchError;
use crate::models::Post;
use crate::reddit::listing::{RedditListing, RedditPostData};
use crate::reddit::PostFetcher;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
pub const REDDIT_AUTH_BASE: &str = "https://www.reddit.com";

/// Refresh tokens this long before Reddit says they expire
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RedditClientConfig {
    pub api_base_url: String,
    pub auth_base_url: String,
    pub timeout_seconds: u64,
}

impl Default for RedditClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: REDDIT_API_BASE.to_string(),
            auth_base_url: REDDIT_AUTH_BASE.to_string(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
    error: Option<String>,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_MARGIN < self.expires_at
    }
}

/// Fetches posts through Reddit's OAuth API
pub struct RedditClient {
    client: Client,
    config: RedditClientConfig,
    credentials: RedditCredentials,
    token: Mutex<Option<AccessToken>>,
}

impl RedditClient {
    pub fn new(config: RedditClientConfig, credentials: RedditCredentials) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(credentials.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            credentials,
            token: Mutex::new(None),
        })
    }

    /// Return a cached token or acquire a new one with the password grant
    #[tracing::instrument(skip(self))]
    async fn access_token(&self) -> Result<String, FetchError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        info!("Authenticating with Reddit");
        let token_url = format!(
            "{}/api/v1/access_token",
            self.config.auth_base_url.trim_end_matches('/')
        );
        let params = [
            ("grant_type", "password"),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
        ];

        let response = self
            .client
            .post(&token_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(response, "access token").await);
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(format!("Failed to parse token response: {}", e)))?;

        let value = match (body.access_token, body.error) {
            (Some(token), None) => token,
            (_, Some(error)) => return Err(FetchError::Unauthorized(error)),
            (None, None) => {
                return Err(FetchError::Unauthorized(
                    "token response missing access_token".to_string(),
                ))
            }
        };

        *cached = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });
        debug!(expires_in = body.expires_in, "Reddit access token acquired");
        Ok(value)
    }

    async fn forget_token(&self) {
        *self.token.lock().await = None;
    }
}

#[async_trait]
impl PostFetcher for RedditClient {
    #[tracing::instrument(skip(self))]
    async fn fetch_new_posts(&self, subreddit: &str, limit: usize) -> Result<Vec<Post>, FetchError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/r/{}/new",
            self.config.api_base_url.trim_end_matches('/'),
            subreddit
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&[("limit", limit.to_string()), ("raw_json", "1".to_string())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                // Expired or revoked token; the next fetch re-authenticates
                self.forget_token().await;
            }
            return Err(status_error(response, subreddit).await);
        }

        let listing: RedditListing<RedditPostData> = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(format!("r/{}: {}", subreddit, e)))?;

        let posts = listing.into_posts();
        debug!(count = posts.len(), "Fetched new posts");
        Ok(posts)
    }
}

/// Map a non-success response onto the fetch error taxonomy
async fn status_error(response: Response, resource: &str) -> FetchError {
    let status = response.status();
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(|secs| secs.ceil() as u64);
            warn!(resource, ?retry_after_secs, "Rate limited by Reddit");
            FetchError::RateLimited { retry_after_secs }
        }
        StatusCode::UNAUTHORIZED => FetchError::Unauthorized(resource.to_string()),
        StatusCode::FORBIDDEN => FetchError::Forbidden(resource.to_string()),
        StatusCode::NOT_FOUND => FetchError::NotFound(resource.to_string()),
        _ => {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            FetchError::Http(format!("{} returned {}: {}", resource, status, snippet))
        }
    }
}
