// Storage backends for the seen-posts record

use crate::errors::StorageError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Where the serialized seen-posts blob lives
#[async_trait]
pub trait SeenPostsBackend: Send + Sync {
    /// Read the whole blob; `None` when nothing has been written yet
    async fn read(&self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the whole blob
    async fn write(&self, bytes: &[u8]) -> Result<(), StorageError>;
}

/// Single file on disk, replaced atomically on every write
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SeenPostsBackend for FileBackend {
    async fn read(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::FileSystemError(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), StorageError> {
        write_atomically(&self.path, bytes).await
    }
}

/// Write to a sibling temp file, fsync it, then rename over `path`
pub(crate) async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            StorageError::FileSystemError(format!(
                "failed to prepare directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record".to_string());
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let result = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(StorageError::FileSystemError(format!(
            "failed to write {}: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}

/// In-memory blob, used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blob: Mutex<Option<Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing blob
    pub fn with_contents(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            blob: Mutex::new(Some(bytes.into())),
        }
    }

    /// Current blob contents
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.blob.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SeenPostsBackend for MemoryBackend {
    async fn read(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.contents())
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), StorageError> {
        *self.blob.lock().unwrap_or_else(|e| e.into_inner()) = Some(bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_backend_missing_file_reads_none() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("seen.txt"));
        assert_eq!(backend.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_backend_write_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("nested").join("seen.txt"));

        backend.write(b"first\n").await.unwrap();
        backend.write(b"second\n").await.unwrap();

        assert_eq!(backend.read().await.unwrap(), Some(b"second\n".to_vec()));

        // No temp files are left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_memory_backend_round_trip() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.read().await.unwrap(), None);
        backend.write(b"a:b\n").await.unwrap();
        assert_eq!(backend.contents(), Some(b"a:b\n".to_vec()));
    }
}
