//! File-backed snapshot storage

use crate::{Snapshot, Storage, StorageError, StorageStats};
use async_trait::async_trait;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// JSON snapshot on the local filesystem.
///
/// Saves go to a sibling `.tmp` file which is synced and then renamed over
/// the target, so a crash mid-write leaves the previous snapshot intact. The
/// directory is synced after the rename so the new entry itself is durable.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("snapshot"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Directory holding the snapshot; `.` for a bare file name
    fn dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    async fn write_atomic(&self, data: &[u8]) -> Result<(), StorageError> {
        let dir = self.dir();
        fs::create_dir_all(dir)
            .await
            .map_err(|e| StorageError::Io(format!("Failed to create {}: {}", dir.display(), e)))?;

        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StorageError::Io(format!("Failed to create temp file: {}", e)))?;

        file.write_all(data)
            .await
            .map_err(|e| StorageError::Io(format!("Failed to write data: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| StorageError::Io(format!("Failed to sync: {}", e)))?;
        drop(file);

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| StorageError::Io(format!("Failed to rename temp file: {}", e)))?;

        sync_dir(dir).await
    }

    async fn read(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(&self.path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// Flush a directory entry table to disk
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<(), StorageError> {
    fs::File::open(dir)
        .await
        .map_err(|e| StorageError::Io(format!("Failed to open {}: {}", dir.display(), e)))?
        .sync_all()
        .await
        .map_err(|e| StorageError::Io(format!("Failed to sync {}: {}", dir.display(), e)))
}

// Directories cannot be opened as files here; the rename is all we get
#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<(), StorageError> {
    Ok(())
}

#[async_trait]
impl Storage for FileStorage {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let data = snapshot.to_json()?;
        self.write_atomic(&data).await?;
        debug!(path = %self.path.display(), values = snapshot.len(), "Snapshot saved");
        Ok(())
    }

    async fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        match self.read().await? {
            Some(data) => Snapshot::from_json(&data).map(Some),
            None => Ok(None),
        }
    }

    async fn stats(&self) -> Result<StorageStats, StorageError> {
        match self.read().await? {
            Some(data) => Ok(StorageStats {
                value_count: Snapshot::from_json(&data)?.len(),
                total_size_bytes: data.len(),
            }),
            None => Ok(StorageStats::default()),
        }
    }
}
