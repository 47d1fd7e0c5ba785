// Error handling framework

use thiserror::Error;

/// Failures of the Reddit read capability
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Rate limited by Reddit (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Access forbidden: {0}")]
    Forbidden(String),

    #[error("Authorization failed: {0}")]
    Unauthorized(String),

    #[error("Subreddit not found: {0}")]
    NotFound(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Failed to decode listing: {0}")]
    Decode(String),

    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether the caller should back off for this cycle instead of reporting an error
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Http(err.to_string())
        }
    }
}

/// Validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Monitor document (config store) errors
#[derive(Error, Debug)]
pub enum ConfigStoreError {
    #[error("Monitor document not found: {0}")]
    DocumentNotFound(String),

    #[error("Filesystem error: {0}")]
    Io(String),

    #[error("Invalid JSON in monitor document: {0}")]
    InvalidJson(String),

    #[error("Invalid monitor definition: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Monitor not found: {0}")]
    MonitorNotFound(String),
}

/// Storage errors for the seen-posts record
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Filesystem error: {0}")]
    FileSystemError(String),

    #[error("Corrupted record: {0}")]
    Corrupted(String),
}

/// Notification delivery errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Invalid delivery target: {0}")]
    InvalidTarget(String),

    #[error("Unsupported delivery scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Delivery request failed: {0}")]
    RequestFailed(String),

    #[error("Delivery rejected with status {status}")]
    Rejected { status: u16 },
}

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Failed to read credentials file: {0}")]
    Io(String),

    #[error("Invalid credentials file: {0}")]
    InvalidJson(String),

    #[error("Missing credentials: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Invalid credential {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("Waiting for credentials was cancelled")]
    Cancelled,
}

/// Scheduler errors that terminate the control loop
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Failed to load initial monitor configuration: {0}")]
    InitialConfig(#[source] ConfigStoreError),

    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        ValidationError::InvalidJson(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigStoreError {
    fn from(err: serde_json::Error) -> Self {
        ConfigStoreError::InvalidJson(err.to_string())
    }
}

impl From<std::io::Error> for ConfigStoreError {
    fn from(err: std::io::Error) -> Self {
        ConfigStoreError::Io(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::FileSystemError(err.to_string())
    }
}
