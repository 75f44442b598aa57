//! seqsync storage backends
//!
//! Persists the value-only snapshot of the shared document:
//! - File (default): JSON array, atomically replaced on every save
//! - Memory: volatile, for tests and ephemeral runs
//! - SQLite: embedded persistence (feature `sqlite`)

pub mod file;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use seqsync_core::Document;
use serde::{Deserialize, Serialize};

/// Storage backend trait
#[async_trait]
pub trait Storage: Send + Sync {
    /// Durably replace the stored snapshot
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError>;

    /// Load the stored snapshot, `None` if nothing was ever saved
    async fn load(&self) -> Result<Option<Snapshot>, StorageError>;

    /// Get storage statistics
    async fn stats(&self) -> Result<StorageStats, StorageError>;
}

/// Value-only projection of the visible document.
///
/// Element ids and timestamps are not kept; a reload rebuilds the sequence
/// under fresh ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub values: Vec<String>,
}

impl Snapshot {
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    pub fn from_json(data: &[u8]) -> Result<Self, StorageError> {
        serde_json::from_slice(data).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

impl From<&Document> for Snapshot {
    fn from(document: &Document) -> Self {
        Self::new(document.values())
    }
}

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub value_count: usize,
    pub total_size_bytes: usize,
}

pub use file::FileStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_is_plain_array() {
        let snapshot = Snapshot::new(vec!["H".into(), "i".into()]);
        assert_eq!(snapshot.to_json().unwrap(), br#"["H","i"]"#);
        assert_eq!(Snapshot::from_json(br#"["H","i"]"#).unwrap(), snapshot);
    }

    #[test]
    fn test_snapshot_rejects_corrupt_data() {
        assert!(matches!(
            Snapshot::from_json(b"[\"H\","),
            Err(StorageError::Serialization(_))
        ));
        assert!(Snapshot::from_json(br#"{"values":[]}"#).is_err());
    }
}
