//! Dataset sources backed by the exchange.

use std::sync::Arc;

use async_trait::async_trait;
use moex_core::{
    Dataset, Dividend, IndexValue, Quote, RemoteSource, Result, SecurityInfo, StartMarker, Ticker,
};
use moex_iss::RetryPolicy;

use crate::manager::{DatasetSource, UpdatePolicy};

/// Dataset name of daily quotes.
pub const QUOTES: &str = "quotes";

/// Dataset name of the securities listing.
pub const SECURITIES_INFO: &str = "securities_info";

/// Dataset name of dividend histories.
pub const DIVIDENDS: &str = "dividends";

/// Dataset name of index histories.
pub const INDEX: &str = "index";

/// Daily quotes of one ticker.
///
/// The full download follows the configured aliases; updates start at the
/// last cached date so the overlapping session gets validated.
#[derive(Debug, Clone)]
pub struct QuotesSource {
    remote: Arc<dyn RemoteSource>,
    retry: RetryPolicy,
    aliases: Vec<Ticker>,
}

impl QuotesSource {
    /// Creates a quotes source.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteSource>, retry: RetryPolicy) -> Self {
        Self {
            remote,
            retry,
            aliases: Vec::new(),
        }
    }

    /// Sets former tickers whose history is merged into the full download.
    #[must_use]
    pub fn with_aliases(mut self, aliases: Vec<Ticker>) -> Self {
        self.aliases = aliases;
        self
    }
}

#[async_trait]
impl DatasetSource for QuotesSource {
    type Record = Quote;

    fn name(&self) -> &str {
        QUOTES
    }

    async fn download_all(&self, key: &str) -> Result<Dataset<Quote>> {
        let ticker = Ticker::new(key);
        if self.aliases.is_empty() {
            moex_iss::quotes(self.remote.as_ref(), &ticker, StartMarker::Beginning, self.retry).await
        } else {
            moex_iss::quotes_with_aliases(self.remote.as_ref(), &ticker, &self.aliases, self.retry)
                .await
        }
    }

    async fn download_update(&self, key: &str, cached: &Dataset<Quote>) -> Result<Dataset<Quote>> {
        match cached.last() {
            Some(last) => {
                let marker = StartMarker::From(last.date);
                moex_iss::quotes(self.remote.as_ref(), &Ticker::new(key), marker, self.retry).await
            }
            None => self.download_all(key).await,
        }
    }
}

/// Listing of all securities on the main board.
///
/// The exchange has no partial query for it, so stale entries are replaced.
#[derive(Debug, Clone)]
pub struct SecuritiesSource {
    remote: Arc<dyn RemoteSource>,
    retry: RetryPolicy,
}

impl SecuritiesSource {
    /// Creates a securities source.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteSource>, retry: RetryPolicy) -> Self {
        Self { remote, retry }
    }
}

#[async_trait]
impl DatasetSource for SecuritiesSource {
    type Record = SecurityInfo;

    fn name(&self) -> &str {
        SECURITIES_INFO
    }

    fn policy(&self) -> UpdatePolicy {
        UpdatePolicy::FromScratch
    }

    async fn download_all(&self, _key: &str) -> Result<Dataset<SecurityInfo>> {
        moex_iss::securities_info(self.remote.as_ref(), None, self.retry).await
    }
}

/// Dividend history of one ticker.
///
/// Updates download the whole history again and go through validation.
#[derive(Debug, Clone)]
pub struct DividendsSource {
    remote: Arc<dyn RemoteSource>,
    retry: RetryPolicy,
}

impl DividendsSource {
    /// Creates a dividends source.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteSource>, retry: RetryPolicy) -> Self {
        Self { remote, retry }
    }
}

#[async_trait]
impl DatasetSource for DividendsSource {
    type Record = Dividend;

    fn name(&self) -> &str {
        DIVIDENDS
    }

    async fn download_all(&self, key: &str) -> Result<Dataset<Dividend>> {
        moex_iss::dividends(self.remote.as_ref(), &Ticker::new(key), self.retry).await
    }
}

/// Daily closes of an exchange index, keyed by its identifier.
#[derive(Debug, Clone)]
pub struct IndexSource {
    remote: Arc<dyn RemoteSource>,
    retry: RetryPolicy,
}

impl IndexSource {
    /// Creates an index source.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteSource>, retry: RetryPolicy) -> Self {
        Self { remote, retry }
    }
}

#[async_trait]
impl DatasetSource for IndexSource {
    type Record = IndexValue;

    fn name(&self) -> &str {
        INDEX
    }

    async fn download_all(&self, key: &str) -> Result<Dataset<IndexValue>> {
        moex_iss::index_history(
            self.remote.as_ref(),
            &Ticker::new(key),
            StartMarker::Beginning,
            self.retry,
        )
        .await
    }

    async fn download_update(
        &self,
        key: &str,
        cached: &Dataset<IndexValue>,
    ) -> Result<Dataset<IndexValue>> {
        match cached.last() {
            Some(last) => {
                let marker = StartMarker::From(last.date);
                moex_iss::index_history(self.remote.as_ref(), &Ticker::new(key), marker, self.retry)
                    .await
            }
            None => self.download_all(key).await,
        }
    }
}
