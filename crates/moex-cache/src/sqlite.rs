//! SQLite-based store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moex_core::{CacheEntry, CacheStore, DataError, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, instrument};

/// SQLite-based store for dataset tables.
///
/// Each entry is one row of the `datasets` table holding the serialized table
/// and its write time. A write is a single `INSERT OR REPLACE`, so an entry is
/// either fully replaced or left untouched.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| DataError::Cache(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite store.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| DataError::Cache(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS datasets (
                dataset TEXT NOT NULL,
                entity TEXT NOT NULL,
                payload TEXT NOT NULL,
                modified_at TEXT NOT NULL,
                PRIMARY KEY (dataset, entity)
            )",
            [],
        )
        .map_err(|e| DataError::Cache(e.to_string()))?;

        debug!("SQLite store schema initialized");
        Ok(())
    }

    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DataError::Parse(format!("Invalid timestamp {s}: {e}")))
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    #[instrument(skip(self))]
    async fn get(&self, dataset: &str, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        let row = conn
            .query_row(
                "SELECT payload, modified_at FROM datasets
                 WHERE dataset = ?1 AND entity = ?2",
                params![dataset, key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        match row {
            Some((payload, modified_at)) => {
                debug!("Found cached entry");
                Ok(Some(CacheEntry {
                    payload,
                    modified_at: Self::parse_timestamp(&modified_at)?,
                }))
            }
            None => {
                debug!("No cached entry found");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn put(&self, dataset: &str, key: &str, payload: &str) -> Result<()> {
        let modified_at = Utc::now().to_rfc3339();

        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        conn.execute(
            "INSERT OR REPLACE INTO datasets (dataset, entity, payload, modified_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![dataset, key, payload, modified_at],
        )
        .map_err(|e| DataError::Cache(e.to_string()))?;

        debug!("Stored entry");
        Ok(())
    }

    async fn last_modified(&self, dataset: &str, key: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        let modified_at = conn
            .query_row(
                "SELECT modified_at FROM datasets WHERE dataset = ?1 AND entity = ?2",
                params![dataset, key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        modified_at.as_deref().map(Self::parse_timestamp).transpose()
    }

    #[instrument(skip(self))]
    async fn remove(&self, dataset: &str, key: &str) -> Result<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        let deleted = conn
            .execute(
                "DELETE FROM datasets WHERE dataset = ?1 AND entity = ?2",
                params![dataset, key],
            )
            .map_err(|e| DataError::Cache(e.to_string()))?;

        Ok(deleted > 0)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        conn.execute("DELETE FROM datasets", [])
            .map_err(|e| DataError::Cache(e.to_string()))?;

        debug!("Cleared all cache entries");
        Ok(())
    }
}
