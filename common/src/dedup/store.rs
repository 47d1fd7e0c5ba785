// Bounded, persistent set of already-notified posts

use crate::dedup::backend::SeenPostsBackend;
use crate::errors::StorageError;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Default size ceiling for the serialized record (5 MiB)
pub const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;

/// Composite `{subreddit}:{post_id}` key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(subreddit: &str, post_id: &str) -> Self {
        Self(format!("{}:{}", subreddit, post_id))
    }

    /// Parse a key read back from storage
    pub fn parse(raw: &str) -> Option<Self> {
        let (subreddit, post_id) = raw.split_once(':')?;
        if subreddit.is_empty() || post_id.is_empty() {
            return None;
        }
        Some(Self::new(subreddit, post_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default)]
struct DedupState {
    /// Keys whose notification attempt has finished; only these are written out
    keys: HashSet<DedupKey>,
    /// Claimed keys still waiting on their notification
    pending: HashSet<DedupKey>,
    degraded: bool,
}

/// Shared dedup store.
///
/// Every operation goes through one mutex, so a check-and-insert by one
/// monitor run can never interleave with another run's read-modify-write,
/// and persists never overlap.
pub struct DedupStore {
    backend: Arc<dyn SeenPostsBackend>,
    max_bytes: usize,
    state: Mutex<DedupState>,
}

impl DedupStore {
    /// Create an empty store; call [`DedupStore::load`] to read the backend
    pub fn new(backend: Arc<dyn SeenPostsBackend>, max_bytes: usize) -> Self {
        Self {
            backend,
            max_bytes,
            state: Mutex::new(DedupState::default()),
        }
    }

    /// Create a store and load whatever the backend holds
    pub async fn open(backend: Arc<dyn SeenPostsBackend>, max_bytes: usize) -> Self {
        let store = Self::new(backend, max_bytes);
        store.load().await;
        store
    }

    /// Replace the in-memory set with the backend's contents.
    ///
    /// A missing blob yields an empty set. An unreadable or undecodable blob
    /// also yields an empty set, logs a warning and marks the store degraded.
    #[instrument(skip(self))]
    pub async fn load(&self) {
        let mut state = self.state.lock().await;
        match self.backend.read().await {
            Ok(None) => {
                debug!("No seen-posts record found, starting empty");
                state.keys.clear();
                state.degraded = false;
            }
            Ok(Some(bytes)) => match decode(&bytes) {
                Ok(keys) => {
                    info!(keys = keys.len(), "Loaded seen-posts record");
                    state.keys = keys;
                    state.degraded = false;
                }
                Err(e) => {
                    warn!(error = %e, "Seen-posts record is corrupted, starting empty");
                    state.keys.clear();
                    state.degraded = true;
                }
            },
            Err(e) => {
                warn!(error = %e, "Failed to read seen-posts record, starting empty");
                state.keys.clear();
                state.degraded = true;
            }
        }
        crate::telemetry::update_dedup_size(state.keys.len());
    }

    pub async fn contains(&self, key: &DedupKey) -> bool {
        self.state.lock().await.keys.contains(key)
    }

    pub async fn add(&self, key: DedupKey) {
        self.state.lock().await.keys.insert(key);
    }

    /// Atomically check and reserve a key. Returns `true` when the key was
    /// neither recorded nor claimed by another run.
    ///
    /// A claimed key is not written out by [`DedupStore::persist`] until
    /// [`DedupStore::record`] is called for it.
    pub async fn claim(&self, key: &DedupKey) -> bool {
        let mut state = self.state.lock().await;
        if state.keys.contains(key) {
            return false;
        }
        state.pending.insert(key.clone())
    }

    /// Promote a claimed key to the persisted set once its notification was attempted
    pub async fn record(&self, key: &DedupKey) {
        let mut state = self.state.lock().await;
        state.pending.remove(key);
        state.keys.insert(key.clone());
    }

    /// Undo a claim whose notification never went out
    pub async fn release(&self, key: &DedupKey) {
        self.state.lock().await.pending.remove(key);
    }

    /// Whether a key is claimed but not yet recorded
    pub async fn is_pending(&self, key: &DedupKey) -> bool {
        self.state.lock().await.pending.contains(key)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.keys.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether the last load had to discard an unreadable record
    pub async fn is_degraded(&self) -> bool {
        self.state.lock().await.degraded
    }

    /// Write the recorded keys to the backend. Pending claims are left out.
    ///
    /// When the serialized set exceeds the size ceiling the whole set is
    /// discarded and an empty record is written instead.
    #[instrument(skip(self))]
    pub async fn persist(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        let mut bytes = encode(&state.keys);

        if bytes.len() > self.max_bytes {
            info!(
                size_bytes = bytes.len(),
                max_bytes = self.max_bytes,
                keys = state.keys.len(),
                "Seen-posts record exceeded max size, resetting"
            );
            state.keys.clear();
            bytes = encode(&state.keys);
        }

        self.backend.write(&bytes).await?;
        crate::telemetry::update_dedup_size(state.keys.len());
        debug!(keys = state.keys.len(), "Seen-posts record persisted");
        Ok(())
    }
}

fn encode(keys: &HashSet<DedupKey>) -> Vec<u8> {
    let mut sorted: Vec<&DedupKey> = keys.iter().collect();
    sorted.sort();

    let mut out = String::with_capacity(sorted.iter().map(|k| k.0.len() + 1).sum());
    for key in sorted {
        out.push_str(key.as_str());
        out.push('\n');
    }
    out.into_bytes()
}

fn decode(bytes: &[u8]) -> Result<HashSet<DedupKey>, StorageError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| StorageError::Corrupted(format!("record is not UTF-8: {}", e)))?;

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(n, line)| {
            DedupKey::parse(line).ok_or_else(|| {
                StorageError::Corrupted(format!("line {} is not a dedup key: {:?}", n + 1, line))
            })
        })
        .collect()
}
