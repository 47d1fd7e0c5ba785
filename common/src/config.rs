// Configuration management with layered configuration (defaults, file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub reddit: RedditConfig,
    pub notifier: NotifierConfig,
    pub observability: ObservabilityConfig,
}

/// Where the three data files live. Relative file names resolve against `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub monitors_file: String,
    pub seen_posts_file: String,
    pub credentials_file: String,
    pub seen_posts_max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_seconds: u64,
    pub fetch_limit: usize,
    /// 0 means no limit
    pub max_concurrent_runs: usize,
    pub credentials_poll_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub api_base_url: String,
    pub auth_base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 0 disables the Prometheus exporter
    pub metrics_port: u16,
    pub tracing_endpoint: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/data"),
            monitors_file: "search.json".to_string(),
            seen_posts_file: "processed_submissions.txt".to_string(),
            credentials_file: "credentials.json".to_string(),
            seen_posts_max_bytes: crate::dedup::DEFAULT_MAX_BYTES,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 120,
            fetch_limit: 10,
            max_concurrent_runs: 0,
            credentials_poll_seconds: 30,
        }
    }
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            api_base_url: crate::reddit::client::REDDIT_API_BASE.to_string(),
            auth_base_url: crate::reddit::client::REDDIT_AUTH_BASE.to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { timeout_seconds: 10 }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_port: 0,
            tracing_endpoint: None,
        }
    }
}

impl StorageConfig {
    fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn monitors_path(&self) -> PathBuf {
        self.resolve(&self.monitors_file)
    }

    pub fn seen_posts_path(&self) -> PathBuf {
        self.resolve(&self.seen_posts_file)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.resolve(&self.credentials_file)
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Not committed to git
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.storage.monitors_file.is_empty() {
            return Err("Storage monitors_file cannot be empty".to_string());
        }
        if self.storage.seen_posts_file.is_empty() {
            return Err("Storage seen_posts_file cannot be empty".to_string());
        }
        if self.storage.seen_posts_max_bytes == 0 {
            return Err("Storage seen_posts_max_bytes must be greater than 0".to_string());
        }

        if self.scheduler.poll_interval_seconds == 0 {
            return Err("Scheduler poll_interval_seconds must be greater than 0".to_string());
        }
        if self.scheduler.fetch_limit == 0 || self.scheduler.fetch_limit > 100 {
            return Err("Scheduler fetch_limit must be between 1 and 100".to_string());
        }
        if self.scheduler.credentials_poll_seconds == 0 {
            return Err("Scheduler credentials_poll_seconds must be greater than 0".to_string());
        }

        if self.reddit.api_base_url.is_empty() || self.reddit.auth_base_url.is_empty() {
            return Err("Reddit base URLs cannot be empty".to_string());
        }
        if self.reddit.timeout_seconds == 0 {
            return Err("Reddit timeout_seconds must be greater than 0".to_string());
        }

        if self.notifier.timeout_seconds == 0 {
            return Err("Notifier timeout_seconds must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.scheduler.poll_interval_seconds, 120);
        assert_eq!(settings.storage.seen_posts_max_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_paths_resolve_against_data_dir() {
        let mut storage = StorageConfig::default();
        assert_eq!(storage.monitors_path(), PathBuf::from("/data/search.json"));
        assert_eq!(
            storage.seen_posts_path(),
            PathBuf::from("/data/processed_submissions.txt")
        );

        storage.credentials_file = "/etc/monitor/credentials.json".to_string();
        assert_eq!(
            storage.credentials_path(),
            PathBuf::from("/etc/monitor/credentials.json")
        );
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "[scheduler]\npoll_interval_seconds = 30\n\n[storage]\ndata_dir = \"/tmp/monitor\"\n",
        )
        .unwrap();

        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.scheduler.poll_interval_seconds, 30);
        assert_eq!(settings.scheduler.fetch_limit, 10);
        assert_eq!(settings.storage.data_dir, PathBuf::from("/tmp/monitor"));
        assert_eq!(settings.observability.log_level, "info");
    }

    #[test]
    fn test_validation_catches_zero_interval() {
        let mut settings = Settings::default();
        settings.scheduler.poll_interval_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_fetch_limit_out_of_range() {
        let mut settings = Settings::default();
        settings.scheduler.fetch_limit = 0;
        assert!(settings.validate().is_err());
        settings.scheduler.fetch_limit = 101;
        assert!(settings.validate().is_err());
    }
}
