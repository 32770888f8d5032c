//! Cache trait for persisting datasets.
//!
//! This module defines the [`CacheStore`] trait: key-value persistence of one
//! serialized table per (dataset name, entity key). Writes replace an entry
//! as a whole; there is no partial update and no schema migration.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use crate::error::Result;

/// Entity key used for datasets that hold one global table.
pub const GLOBAL_KEY: &str = "";

/// A stored dataset payload with its modification time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    /// Serialized table.
    pub payload: String,
    /// Time of the last successful write.
    pub modified_at: DateTime<Utc>,
}

/// Trait for persisting dataset tables.
///
/// Implementations must make [`put`](CacheStore::put) all-or-nothing: after
/// an error the previous payload is still readable.
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// Retrieves an entry.
    ///
    /// Returns `Ok(Some(entry))` if cached, `Ok(None)` if not cached.
    async fn get(&self, dataset: &str, key: &str) -> Result<Option<CacheEntry>>;

    /// Stores an entry, fully replacing any previous payload.
    async fn put(&self, dataset: &str, key: &str, payload: &str) -> Result<()>;

    /// Returns the time of the last write, or `None` if the entry is absent.
    async fn last_modified(&self, dataset: &str, key: &str) -> Result<Option<DateTime<Utc>>>;

    /// Removes an entry. Returns true if it existed.
    async fn remove(&self, dataset: &str, key: &str) -> Result<bool>;

    /// Clears all entries.
    async fn clear(&self) -> Result<()>;
}
