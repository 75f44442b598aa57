//! SQLite storage backend

use crate::{Snapshot, Storage, StorageError, StorageStats};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite storage backend
///
/// Embedded persistence for single-node setups. Each save replaces the
/// snapshot rows inside one transaction.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Create a new SQLite storage with the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS snapshot (
                position INTEGER PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS snapshot_meta (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                value_count INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let mut conn = self.conn.lock();

        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        tx.execute("DELETE FROM snapshot", [])
            .map_err(|e| StorageError::Database(e.to_string()))?;

        {
            let mut stmt = tx
                .prepare("INSERT INTO snapshot (position, value) VALUES (?1, ?2)")
                .map_err(|e| StorageError::Database(e.to_string()))?;

            for (position, value) in snapshot.values.iter().enumerate() {
                stmt.execute(params![position as i64, value])
                    .map_err(|e| StorageError::Database(e.to_string()))?;
            }
        }

        tx.execute(
            r#"
            INSERT INTO snapshot_meta (id, value_count)
            VALUES (0, ?1)
            ON CONFLICT(id) DO UPDATE SET
                value_count = excluded.value_count
            "#,
            params![snapshot.len() as i64],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    async fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        let conn = self.conn.lock();

        let expected: Option<i64> = conn
            .query_row(
                "SELECT value_count FROM snapshot_meta WHERE id = 0",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let Some(expected) = expected else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare("SELECT value FROM snapshot ORDER BY position")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let values = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if values.len() as i64 != expected {
            return Err(StorageError::Database(format!(
                "snapshot has {} rows, metadata records {}",
                values.len(),
                expected
            )));
        }

        Ok(Some(Snapshot::new(values)))
    }

    async fn stats(&self) -> Result<StorageStats, StorageError> {
        let conn = self.conn.lock();

        let (value_count, total_size): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(LENGTH(CAST(value AS BLOB))), 0) FROM snapshot",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(StorageStats {
            value_count: value_count as usize,
            total_size_bytes: total_size as usize,
        })
    }
}
