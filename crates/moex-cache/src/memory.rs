//! In-memory store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moex_core::{CacheEntry, CacheStore, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Key of a stored entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    dataset: String,
    key: String,
}

impl EntryKey {
    fn new(dataset: &str, key: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            key: key.to_string(),
        }
    }
}

/// Simple in-memory store for testing and development.
///
/// Entries are stored in a `RwLock`-protected `HashMap` and are lost when the
/// store is dropped. Payloads are cloned on get/put operations.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<EntryKey, CacheEntry>>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    #[instrument(skip(self))]
    async fn get(&self, dataset: &str, key: &str) -> Result<Option<CacheEntry>> {
        let entries = self.entries.read().await;
        match entries.get(&EntryKey::new(dataset, key)) {
            Some(entry) => {
                debug!("Cache hit");
                Ok(Some(entry.clone()))
            }
            None => {
                debug!("Cache miss");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn put(&self, dataset: &str, key: &str, payload: &str) -> Result<()> {
        let entry = CacheEntry {
            payload: payload.to_string(),
            modified_at: Utc::now(),
        };
        self.entries
            .write()
            .await
            .insert(EntryKey::new(dataset, key), entry);
        debug!("Stored entry");
        Ok(())
    }

    async fn last_modified(&self, dataset: &str, key: &str) -> Result<Option<DateTime<Utc>>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&EntryKey::new(dataset, key))
            .map(|entry| entry.modified_at))
    }

    #[instrument(skip(self))]
    async fn remove(&self, dataset: &str, key: &str) -> Result<bool> {
        let removed = self
            .entries
            .write()
            .await
            .remove(&EntryKey::new(dataset, key))
            .is_some();
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        debug!("Cleared all cache entries");
        Ok(())
    }
}
