//! Error types for data operations.
//!
//! This module defines [`DataError`] which covers all error cases that can occur
//! when fetching, validating, caching or deriving market data. Every error is
//! local to one (dataset, entity) pair.

use thiserror::Error;

/// Errors that can occur during data operations.
#[derive(Error, Debug)]
pub enum DataError {
    /// The transport gave up waiting for a response. Retryable.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Any other transport failure (connection refused, HTTP status, TLS...).
    #[error("Network error: {0}")]
    Network(String),

    /// A full-history request returned no rows on its first page.
    ///
    /// Usually means the entity key (ticker, registration number) is wrong.
    #[error("Empty response, check the request: {url}")]
    EmptyResponse {
        /// The request that came back empty.
        url: String,
    },

    /// A batch request returned a different number of rows than entities requested.
    #[error("Requested {requested} entities but the response has {returned} rows")]
    RowCountMismatch {
        /// Number of entities in the request.
        requested: usize,
        /// Number of rows in the response.
        returned: usize,
    },

    /// Freshly fetched rows disagree with cached rows on the same index.
    #[error("Fresh {dataset} data for {key} differs from the cached version at {index}")]
    DataIntegrity {
        /// Dataset name.
        dataset: String,
        /// Entity key of the cache entry.
        key: String,
        /// First index value where the versions diverge.
        index: String,
    },

    /// Settlement shift was asked to work on an empty trading calendar.
    #[error("Trading calendar is empty")]
    EmptyCalendar,

    /// Two rows of one table share an index value.
    #[error("Duplicate index value {0}")]
    DuplicateKey(String),

    /// Error parsing data from the remote source or the cache.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error interacting with the cache store.
    #[error("Cache error: {0}")]
    Cache(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl DataError {
    /// Returns true if the failed request may simply be issued again.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;
