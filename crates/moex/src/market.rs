//! Cached market data service.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use moex_core::{
    CacheStore, DataError, Dataset, Dividend, DividendEvent, GLOBAL_KEY, IndexValue, Quote,
    RemoteSource, Result, ReturnFrequency, SecurityInfo, Ticker,
};
use moex_iss::RetryPolicy;
use tracing::{debug, info, instrument, warn};

use crate::lookup::SecurityLookup;
use crate::manager::{DEFAULT_FRESHNESS, DataManager, DatasetSource};
use crate::returns;
use crate::sources::{DividendsSource, IndexSource, QUOTES, QuotesSource, SecuritiesSource};
use crate::table::TickerTable;

/// Entry point for downstream consumers.
///
/// Every dataset goes through a [`DataManager`] over the shared store, so a
/// call returns the cached table when it is fresh and synchronizes it with
/// the exchange otherwise.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use moex::{IssClient, MarketData, SqliteStore, Ticker, ReturnFrequency};
/// use chrono::NaiveDate;
///
/// let market = MarketData::new(
///     Arc::new(IssClient::new()?),
///     Arc::new(SqliteStore::new("moex.db")?),
/// );
/// let tickers = [Ticker::new("GMKN"), Ticker::new("MTSS")];
/// let as_of = NaiveDate::from_ymd_opt(2018, 10, 6).unwrap();
/// let returns = market
///     .log_returns_with_div(&tickers, as_of, ReturnFrequency::Monthly)
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct MarketData {
    remote: Arc<dyn RemoteSource>,
    store: Arc<dyn CacheStore>,
    retry: RetryPolicy,
    freshness: Duration,
}

/// Outcome of a batch load.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Tickers loaded, with their row counts.
    pub loaded: Vec<(Ticker, usize)>,
    /// Tickers that failed, with their errors.
    pub failed: Vec<(Ticker, DataError)>,
}

impl BatchReport {
    /// Number of tickers attempted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.loaded.len() + self.failed.len()
    }

    /// Returns true if no ticker failed.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

impl MarketData {
    /// Creates a service over a remote source and a cache store.
    pub fn new(remote: Arc<dyn RemoteSource>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            remote,
            store,
            retry: RetryPolicy::default(),
            freshness: DEFAULT_FRESHNESS,
        }
    }

    /// Sets the retry policy for timed-out requests.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the age after which cached entries are refreshed.
    #[must_use]
    pub const fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// The cache store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    fn manager<S: DatasetSource>(&self, source: S, key: &str) -> DataManager<S> {
        DataManager::new(source, Arc::clone(&self.store), key).with_freshness(self.freshness)
    }

    /// Starts a lookup scope over the securities listing.
    #[must_use]
    pub fn lookup(&self) -> SecurityLookup<'_> {
        SecurityLookup::new(self)
    }

    /// Returns the listing of all securities on the main board.
    ///
    /// # Errors
    /// Returns download and store errors.
    pub async fn securities_info(&self) -> Result<Dataset<SecurityInfo>> {
        let source = SecuritiesSource::new(Arc::clone(&self.remote), self.retry);
        self.manager(source, GLOBAL_KEY).load().await
    }

    pub(crate) async fn search_aliases(&self, reg_number: &str) -> Result<Vec<Ticker>> {
        moex_iss::aliases(self.remote.as_ref(), reg_number, self.retry).await
    }

    /// Returns all tickers sharing the registration number of `ticker`.
    ///
    /// # Errors
    /// See [`SecurityLookup::aliases`].
    pub async fn aliases(&self, ticker: &Ticker) -> Result<Vec<Ticker>> {
        self.lookup().aliases(ticker).await
    }

    /// Returns the daily quotes of a ticker.
    ///
    /// The first load also collects the history the security traded under
    /// earlier tickers, so the ticker must be in the securities listing.
    ///
    /// # Errors
    /// Returns lookup, download, validation and store errors.
    #[instrument(skip(self))]
    pub async fn quotes(&self, ticker: &Ticker) -> Result<Dataset<Quote>> {
        let mut source = QuotesSource::new(Arc::clone(&self.remote), self.retry);
        if self.store.last_modified(QUOTES, ticker.as_str()).await?.is_none() {
            let aliases = self.aliases(ticker).await?;
            debug!(?aliases, "Bootstrapping quotes");
            source = source.with_aliases(aliases);
        }
        self.manager(source, ticker.as_str()).load().await
    }

    /// Returns the dividend history of a ticker.
    ///
    /// # Errors
    /// Returns download, validation and store errors.
    pub async fn dividends(&self, ticker: &Ticker) -> Result<Dataset<Dividend>> {
        let source = DividendsSource::new(Arc::clone(&self.remote), self.retry);
        self.manager(source, ticker.as_str()).load().await
    }

    /// Returns the daily closes of an index, e.g. [`TOTAL_RETURN_INDEX`](moex_iss::TOTAL_RETURN_INDEX).
    ///
    /// # Errors
    /// Returns download, validation and store errors.
    pub async fn index(&self, index: &Ticker) -> Result<Dataset<IndexValue>> {
        let source = IndexSource::new(Arc::clone(&self.remote), self.retry);
        self.manager(source, index.as_str()).load().await
    }

    /// Returns the dividends of several tickers as return inputs.
    ///
    /// # Errors
    /// Fails on the first ticker that cannot be loaded.
    pub async fn dividend_events(&self, tickers: &[Ticker]) -> Result<Vec<DividendEvent>> {
        let mut events = Vec::new();
        for ticker in tickers {
            events.extend(self.dividends(ticker).await?.iter().map(|d| d.event(ticker)));
        }
        Ok(events)
    }

    async fn quote_series(&self, tickers: &[Ticker]) -> Result<Vec<(Ticker, Dataset<Quote>)>> {
        let mut series = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            series.push((ticker.clone(), self.quotes(ticker).await?));
        }
        Ok(series)
    }

    /// Returns close prices aligned over the union of trading dates.
    ///
    /// # Errors
    /// Fails on the first ticker that cannot be loaded.
    pub async fn prices(&self, tickers: &[Ticker]) -> Result<TickerTable> {
        let series = self.quote_series(tickers).await?;
        Ok(TickerTable::from_quotes(&series, |q| q.close))
    }

    /// Returns traded volumes aligned over the union of trading dates.
    ///
    /// # Errors
    /// Fails on the first ticker that cannot be loaded.
    pub async fn volumes(&self, tickers: &[Ticker]) -> Result<TickerTable> {
        let series = self.quote_series(tickers).await?;
        Ok(TickerTable::from_quotes(&series, |q| Some(q.volume)))
    }

    /// Returns dividend-adjusted log returns from the cached quotes and dividends.
    ///
    /// # Errors
    /// Returns loading errors and the errors of
    /// [`log_returns_with_div`](crate::log_returns_with_div).
    #[instrument(skip(self, tickers), fields(tickers = tickers.len()))]
    pub async fn log_returns_with_div(
        &self,
        tickers: &[Ticker],
        as_of: NaiveDate,
        frequency: ReturnFrequency,
    ) -> Result<TickerTable> {
        let prices = self.prices(tickers).await?;
        let dividends = self.dividend_events(tickers).await?;
        returns::log_returns_with_div(tickers, as_of, &prices, &dividends, frequency)
    }

    /// Loads the quotes of each ticker, isolating failures.
    pub async fn load_quotes_batch(&self, tickers: &[Ticker]) -> BatchReport {
        let mut report = BatchReport::default();
        for ticker in tickers {
            match self.quotes(ticker).await {
                Ok(quotes) => report.loaded.push((ticker.clone(), quotes.len())),
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "Failed to load quotes");
                    report.failed.push((ticker.clone(), e));
                }
            }
        }
        info!(
            total = report.total(),
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Quotes batch finished"
        );
        report
    }
}
