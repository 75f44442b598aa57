//! In-memory storage backend

use crate::{Snapshot, Storage, StorageError, StorageStats};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory storage backend
///
/// Fast, volatile storage suitable for development and tests.
/// Data is lost when the process exits.
pub struct MemoryStorage {
    /// Encoded snapshot, kept as bytes so saves exercise serialization
    data: Mutex<Option<Vec<u8>>>,
    saves: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(None),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let bytes = snapshot.to_json()?;
        *self.data.lock() = Some(bytes);
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        match self.data.lock().as_deref() {
            Some(bytes) => Snapshot::from_json(bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn stats(&self) -> Result<StorageStats, StorageError> {
        match self.data.lock().as_deref() {
            Some(bytes) => Ok(StorageStats {
                value_count: Snapshot::from_json(bytes)?.len(),
                total_size_bytes: bytes.len(),
            }),
            None => Ok(StorageStats::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_load() {
        let storage = MemoryStorage::new();
        assert!(storage.load().await.unwrap().is_none());

        let snapshot = Snapshot::new(vec!["a".into(), "b".into()]);
        storage.save(&snapshot).await.unwrap();

        assert_eq!(storage.load().await.unwrap().unwrap(), snapshot);
        assert_eq!(storage.save_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_snapshot_is_not_missing() {
        let storage = MemoryStorage::new();
        storage.save(&Snapshot::default()).await.unwrap();

        assert_eq!(storage.load().await.unwrap(), Some(Snapshot::default()));
    }

    #[tokio::test]
    async fn test_stats() {
        let storage = MemoryStorage::new();
        storage
            .save(&Snapshot::new(vec!["some".into(), "data".into()]))
            .await
            .unwrap();

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.value_count, 2);
        assert!(stats.total_size_bytes > 0);
    }
}
