// Credentials: Reddit API access plus notification targets
//
// Loaded from `credentials.json` with per-field environment fallback, then
// held read-only for the life of the process.

use crate::errors::CredentialsError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Reddit script-app credentials
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("user_agent", &self.user_agent)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub reddit: RedditCredentials,
    pub notification_urls: Vec<String>,
}

impl Credentials {
    /// Names of the required Reddit fields that are empty
    pub fn missing_fields(&self) -> Vec<String> {
        self.reddit_fields()
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Reject empty or non-ASCII Reddit fields, naming the first offender.
    ///
    /// Non-ASCII characters (e.g. a Cyrillic `І` pasted in place of `I`)
    /// are a common copy/paste mistake that makes OAuth fail opaquely.
    pub fn validate(&self) -> Result<(), CredentialsError> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(CredentialsError::Missing(missing));
        }
        for (name, value) in self.reddit_fields() {
            if let Some((pos, ch)) = value.char_indices().find(|(_, c)| !c.is_ascii()) {
                return Err(CredentialsError::Invalid {
                    field: name.to_string(),
                    reason: format!("Non-ASCII character {:?} at position {}", ch, pos),
                });
            }
        }
        Ok(())
    }

    fn reddit_fields(&self) -> [(&'static str, &str); 5] {
        [
            ("reddit_client_id", self.reddit.client_id.as_str()),
            ("reddit_client_secret", self.reddit.client_secret.as_str()),
            ("reddit_user_agent", self.reddit.user_agent.as_str()),
            ("reddit_username", self.reddit.username.as_str()),
            ("reddit_password", self.reddit.password.as_str()),
        ]
    }
}

/// On-disk shape of `credentials.json`
#[derive(Debug, Clone, Default, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    notification_urls: Vec<String>,
    reddit_client_id: Option<String>,
    reddit_client_secret: Option<String>,
    reddit_user_agent: Option<String>,
    reddit_username: Option<String>,
    reddit_password: Option<String>,
    pushover_app_token: Option<String>,
    pushover_user_key: Option<String>,
}

/// Source of credentials, polled until complete at startup
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn load(&self) -> Credentials;
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads `credentials.json`, falling back to environment variables per field
pub struct FileCredentialsProvider {
    path: PathBuf,
    env: EnvLookup,
}

impl FileCredentialsProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_env(path, Arc::new(|key: &str| std::env::var(key).ok()))
    }

    /// Use a custom environment lookup instead of the process environment
    pub fn with_env(path: impl Into<PathBuf>, env: EnvLookup) -> Self {
        Self {
            path: path.into(),
            env,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> CredentialsFile {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(file) => {
                    info!(path = %self.path.display(), "Loaded credentials file");
                    file
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Invalid credentials file, using environment variables");
                    CredentialsFile::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No credentials file found, using environment variables");
                CredentialsFile::default()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read credentials file, using environment variables");
                CredentialsFile::default()
            }
        }
    }

    fn field(&self, from_file: Option<String>, env_key: &str) -> Option<String> {
        from_file
            .filter(|v| !v.trim().is_empty())
            .or_else(|| (self.env)(env_key).filter(|v| !v.trim().is_empty()))
    }
}

#[async_trait]
impl CredentialsProvider for FileCredentialsProvider {
    async fn load(&self) -> Credentials {
        let file = self.read_file().await;

        let mut notification_urls = file.notification_urls.clone();
        if notification_urls.is_empty() {
            let token = self.field(file.pushover_app_token.clone(), "PUSHOVER_APP_TOKEN");
            let user = self.field(file.pushover_user_key.clone(), "PUSHOVER_USER_KEY");
            if let (Some(token), Some(user)) = (token, user) {
                notification_urls.push(format!("pover://{}@{}", user, token));
                info!("Migrated legacy Pushover credentials to a delivery target");
            }
        }

        Credentials {
            reddit: RedditCredentials {
                client_id: self
                    .field(file.reddit_client_id, "REDDIT_CLIENT_ID")
                    .unwrap_or_default(),
                client_secret: self
                    .field(file.reddit_client_secret, "REDDIT_CLIENT_SECRET")
                    .unwrap_or_default(),
                user_agent: self
                    .field(file.reddit_user_agent, "REDDIT_USER_AGENT")
                    .unwrap_or_default(),
                username: self
                    .field(file.reddit_username, "REDDIT_USERNAME")
                    .unwrap_or_default(),
                password: self
                    .field(file.reddit_password, "REDDIT_PASSWORD")
                    .unwrap_or_default(),
            },
            notification_urls,
        }
    }
}

/// Block until the provider yields every required Reddit field.
///
/// Polls every `interval`, logging what is missing. Notification targets are
/// optional; their absence is only a warning.
pub async fn await_credentials(
    provider: &dyn CredentialsProvider,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<Credentials, CredentialsError> {
    loop {
        let credentials = provider.load().await;
        let missing = credentials.missing_fields();

        if missing.is_empty() {
            if credentials.notification_urls.is_empty() {
                warn!("No notification services configured - notifications disabled");
            } else {
                info!(
                    services = credentials.notification_urls.len(),
                    "Notification services configured"
                );
            }
            info!("Reddit credentials configured");
            return Ok(credentials);
        }

        warn!(
            missing = %missing.join(", "),
            retry_in_seconds = interval.as_secs(),
            "Waiting for Reddit credentials"
        );

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => return Err(CredentialsError::Cancelled),
        }
    }
}
