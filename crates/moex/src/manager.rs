//! Cache lifecycle of one dataset entry.
//!
//! A [`DataManager`] owns one (dataset, key) entry of a [`CacheStore`]. On
//! [`load`](DataManager::load) it either bootstraps the entry with a full
//! download, or, once the entry is older than the freshness window, fetches
//! the increment, checks it against the cached rows and appends what is new.
//! Dataset kinds only supply their download calls through [`DatasetSource`].

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moex_core::{CacheStore, DataError, Dataset, Record, Result};
use tracing::{debug, info, instrument};

/// Default age after which an entry is refreshed.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(24 * 60 * 60);

/// How a stale entry is refreshed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum UpdatePolicy {
    /// Fetch the increment, validate the overlap, append new rows.
    #[default]
    Incremental,
    /// Download everything again and replace the entry.
    FromScratch,
}

/// Download calls of one dataset kind.
#[async_trait]
pub trait DatasetSource: Send + Sync + Debug {
    /// Row type of the dataset.
    type Record: Record;

    /// Dataset name, used as the cache namespace.
    fn name(&self) -> &str;

    /// Refresh strategy for stale entries.
    fn policy(&self) -> UpdatePolicy {
        UpdatePolicy::Incremental
    }

    /// Downloads the full available history for `key`.
    async fn download_all(&self, key: &str) -> Result<Dataset<Self::Record>>;

    /// Downloads rows published since `cached` was stored.
    ///
    /// The result should overlap the cached rows by at least one index value
    /// so revisions can be detected. Defaults to a full download.
    async fn download_update(
        &self,
        key: &str,
        _cached: &Dataset<Self::Record>,
    ) -> Result<Dataset<Self::Record>> {
        self.download_all(key).await
    }
}

/// Synchronizes one cache entry with its remote source.
#[derive(Debug)]
pub struct DataManager<S> {
    source: S,
    store: Arc<dyn CacheStore>,
    key: String,
    freshness: Duration,
}

impl<S: DatasetSource> DataManager<S> {
    /// Creates a manager for the entry `key` of the source's dataset.
    pub fn new(source: S, store: Arc<dyn CacheStore>, key: impl Into<String>) -> Self {
        Self {
            source,
            store,
            key: key.into(),
            freshness: DEFAULT_FRESHNESS,
        }
    }

    /// Sets the age after which the entry is refreshed.
    #[must_use]
    pub const fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// Entity key of the managed entry.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The dataset source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Returns the current table, downloading or refreshing it as needed.
    ///
    /// # Errors
    /// Returns download, validation and store errors. On any error the
    /// stored entry is left as it was.
    #[instrument(skip(self), fields(dataset = self.source.name(), key = %self.key))]
    pub async fn load(&self) -> Result<Dataset<S::Record>> {
        match self.store.get(self.source.name(), &self.key).await? {
            None => self.create_local_history().await,
            Some(entry) => self.refresh(&entry.payload, entry.modified_at).await,
        }
    }

    /// Returns true if the entry is missing or older than the freshness window.
    ///
    /// # Errors
    /// Returns store errors.
    pub async fn needs_update(&self) -> Result<bool> {
        let modified_at = self.store.last_modified(self.source.name(), &self.key).await?;
        Ok(modified_at.is_none_or(|at| self.is_stale(at)))
    }

    /// Refreshes an existing entry.
    ///
    /// # Errors
    /// Returns [`DataError::Cache`] if the entry does not exist yet, and
    /// download, validation and store errors.
    #[instrument(skip(self), fields(dataset = self.source.name(), key = %self.key))]
    pub async fn update_local_history(&self) -> Result<Dataset<S::Record>> {
        let entry = self
            .store
            .get(self.source.name(), &self.key)
            .await?
            .ok_or_else(|| {
                DataError::Cache(format!(
                    "No local {} history for {}",
                    self.source.name(),
                    self.key
                ))
            })?;
        self.refresh(&entry.payload, entry.modified_at).await
    }

    /// Downloads the full history and replaces the entry with it.
    ///
    /// # Errors
    /// Returns download and store errors.
    pub async fn create_local_history(&self) -> Result<Dataset<S::Record>> {
        let data = self.source.download_all(&self.key).await?;
        self.save(&data).await?;
        info!(
            dataset = self.source.name(),
            key = %self.key,
            rows = data.len(),
            "Created local history"
        );
        Ok(data)
    }

    fn is_stale(&self, modified_at: DateTime<Utc>) -> bool {
        let age = (Utc::now() - modified_at).to_std().unwrap_or_default();
        age >= self.freshness
    }

    async fn refresh(
        &self,
        payload: &str,
        modified_at: DateTime<Utc>,
    ) -> Result<Dataset<S::Record>> {
        let cached = Dataset::<S::Record>::from_json(payload)?;
        if !self.is_stale(modified_at) {
            debug!(rows = cached.len(), "Local history is fresh");
            return Ok(cached);
        }

        match self.source.policy() {
            UpdatePolicy::FromScratch => self.create_local_history().await,
            UpdatePolicy::Incremental => {
                let fresh = self.source.download_update(&self.key, &cached).await?;
                self.validate(&cached, &fresh)?;
                let (merged, added) = cached.merge(&fresh);
                self.save(&merged).await?;
                info!(
                    dataset = self.source.name(),
                    key = %self.key,
                    added,
                    rows = merged.len(),
                    "Updated local history"
                );
                Ok(merged)
            }
        }
    }

    /// Checks that fresh rows agree with cached rows on their common index.
    fn validate(&self, cached: &Dataset<S::Record>, fresh: &Dataset<S::Record>) -> Result<()> {
        match cached.first_mismatch(fresh) {
            Some(index) => Err(DataError::DataIntegrity {
                dataset: self.source.name().to_string(),
                key: self.key.clone(),
                index: index.to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn save(&self, data: &Dataset<S::Record>) -> Result<()> {
        let payload = data.to_json()?;
        self.store.put(self.source.name(), &self.key, &payload).await
    }
}
