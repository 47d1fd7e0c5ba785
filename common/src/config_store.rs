// Monitor document store (`search.json`)
//
// The scheduler only reads through `MonitorSource`; the management
// operations below are what an editing surface calls.

use crate::dedup::backend::write_atomically;
use crate::errors::{ConfigStoreError, ValidationError};
use crate::models::{Monitor, MonitorDraft, MonitorUpdate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Read access to the monitor collection
#[async_trait]
pub trait MonitorSource: Send + Sync {
    /// Cheap change marker; `None` when the document cannot be stat'ed
    fn modified_marker(&self) -> Option<SystemTime>;

    /// Load, default and validate the full monitor list
    async fn load_monitors(&self) -> Result<Vec<Monitor>, ConfigStoreError>;
}

/// The JSON document as stored on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorDocument {
    #[serde(rename = "subreddits_to_search", default)]
    pub monitors: Vec<Monitor>,
    /// Unknown top-level keys, kept so saves do not drop them
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MonitorDocument {
    /// Parse a document and resolve per-monitor defaults.
    ///
    /// Entries without an id get a unique fallback that stays the same on
    /// every load of an unchanged document; the next save writes it out.
    /// Explicit duplicate ids are still rejected by [`MonitorDocument::validate`].
    pub fn parse(contents: &str) -> Result<Self, ConfigStoreError> {
        let mut document: MonitorDocument = serde_json::from_str(contents)?;
        for (index, monitor) in document.monitors.iter_mut().enumerate() {
            monitor.resolve_defaults(index);
        }

        let mut taken: HashSet<String> = document
            .monitors
            .iter()
            .filter(|m| !m.id.is_empty())
            .map(|m| m.id.clone())
            .collect();
        for (index, monitor) in document.monitors.iter_mut().enumerate() {
            if monitor.id.is_empty() {
                monitor.id = monitor.fallback_id(index, &taken);
                debug!(monitor_id = %monitor.id, "Assigned id to legacy monitor");
                taken.insert(monitor.id.clone());
            }
        }

        document.validate()?;
        Ok(document)
    }

    /// Every monitor is valid and ids are unique
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for monitor in &self.monitors {
            monitor.validate()?;
            if !seen.insert(monitor.id.as_str()) {
                return Err(ValidationError::ConstraintViolation(format!(
                    "duplicate monitor id '{}'",
                    monitor.id
                )));
            }
        }
        Ok(())
    }
}

/// File-backed monitor store
pub struct JsonMonitorStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonMonitorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<MonitorDocument, ConfigStoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigStoreError::DocumentNotFound(
                    self.path.display().to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        MonitorDocument::parse(&contents)
    }

    /// Read the document, starting an empty one when the file does not exist
    async fn read_or_default(&self) -> Result<MonitorDocument, ConfigStoreError> {
        match self.read_document().await {
            Err(ConfigStoreError::DocumentNotFound(_)) => Ok(MonitorDocument::default()),
            other => other,
        }
    }

    async fn write_document(&self, document: &MonitorDocument) -> Result<(), ConfigStoreError> {
        document.validate()?;
        let json = serde_json::to_vec_pretty(document)?;
        write_atomically(&self.path, &json)
            .await
            .map_err(|e| ConfigStoreError::Io(e.to_string()))?;
        debug!(path = %self.path.display(), monitors = document.monitors.len(), "Monitor document saved");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Monitor>, ConfigStoreError> {
        Ok(self.read_or_default().await?.monitors)
    }

    pub async fn get(&self, id: &str) -> Result<Monitor, ConfigStoreError> {
        self.list()
            .await?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| ConfigStoreError::MonitorNotFound(id.to_string()))
    }

    /// Create a monitor with defaults, a fresh id and the next unused colour
    #[instrument(skip(self, draft), fields(subreddit = %draft.subreddit))]
    pub async fn create(&self, draft: MonitorDraft) -> Result<Monitor, ConfigStoreError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_or_default().await?;
        let monitor = draft.into_monitor(&document.monitors)?;
        document.monitors.push(monitor.clone());
        self.write_document(&document).await?;
        info!(monitor_id = %monitor.id, "Monitor created");
        Ok(monitor)
    }

    /// Apply a field-wise update to one monitor
    #[instrument(skip(self, update))]
    pub async fn update(&self, id: &str, update: MonitorUpdate) -> Result<Monitor, ConfigStoreError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_or_default().await?;
        let monitor = document
            .monitors
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| ConfigStoreError::MonitorNotFound(id.to_string()))?;
        monitor.apply(update);
        let updated = monitor.clone();
        self.write_document(&document).await?;
        info!(monitor_id = %id, "Monitor updated");
        Ok(updated)
    }

    /// Remove a monitor by id
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), ConfigStoreError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_or_default().await?;
        let before = document.monitors.len();
        document.monitors.retain(|m| m.id != id);
        if document.monitors.len() == before {
            return Err(ConfigStoreError::MonitorNotFound(id.to_string()));
        }
        self.write_document(&document).await?;
        info!(monitor_id = %id, "Monitor deleted");
        Ok(())
    }
}

#[async_trait]
impl MonitorSource for JsonMonitorStore {
    fn modified_marker(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok()
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load_monitors(&self) -> Result<Vec<Monitor>, ConfigStoreError> {
        let document = self.read_document().await?;
        info!(monitors = document.monitors.len(), "Loaded monitor configuration");
        Ok(document.monitors)
    }
}
