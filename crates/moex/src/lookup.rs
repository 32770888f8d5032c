//! Scoped lookups into the securities listing.

use moex_core::{DataError, Dataset, Result, SecurityInfo, Ticker};
use tokio::sync::OnceCell;

use crate::market::MarketData;

/// Reference data lookups sharing one copy of the securities listing.
///
/// The listing is loaded on first use and kept for the lifetime of the
/// lookup; create a new lookup to see a refreshed listing.
#[derive(Debug)]
pub struct SecurityLookup<'a> {
    market: &'a MarketData,
    listing: OnceCell<Dataset<SecurityInfo>>,
}

impl<'a> SecurityLookup<'a> {
    pub(crate) fn new(market: &'a MarketData) -> Self {
        Self {
            market,
            listing: OnceCell::new(),
        }
    }

    /// Returns the securities listing, loading it on first use.
    ///
    /// # Errors
    /// Returns the errors of [`MarketData::securities_info`].
    pub async fn listing(&self) -> Result<&Dataset<SecurityInfo>> {
        self.listing
            .get_or_try_init(|| self.market.securities_info())
            .await
    }

    /// Returns the reference data of a ticker.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] for tickers missing from the listing.
    pub async fn info(&self, ticker: &Ticker) -> Result<&SecurityInfo> {
        self.listing()
            .await?
            .get(ticker)
            .ok_or_else(|| DataError::InvalidParameter(format!("Unknown ticker {ticker}")))
    }

    /// Returns the lot size of a ticker.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] for tickers missing from the listing.
    pub async fn lot_size(&self, ticker: &Ticker) -> Result<u32> {
        Ok(self.info(ticker).await?.lot_size)
    }

    /// Returns the lot sizes of several tickers, in order.
    ///
    /// # Errors
    /// Fails on the first ticker missing from the listing.
    pub async fn lot_sizes(&self, tickers: &[Ticker]) -> Result<Vec<u32>> {
        let mut sizes = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            sizes.push(self.lot_size(ticker).await?);
        }
        Ok(sizes)
    }

    /// Returns the registration number of a ticker, if it has one.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] for tickers missing from the listing.
    pub async fn reg_number(&self, ticker: &Ticker) -> Result<Option<&str>> {
        Ok(self.info(ticker).await?.reg_number.as_deref())
    }

    /// Returns all tickers sharing the registration number of `ticker`.
    ///
    /// A ticker without a registration number is its own only alias.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] for tickers missing from the
    /// listing, and transport errors of the alias search.
    pub async fn aliases(&self, ticker: &Ticker) -> Result<Vec<Ticker>> {
        match self.reg_number(ticker).await? {
            Some(reg_number) => self.market.search_aliases(reg_number).await,
            None => Ok(vec![ticker.clone()]),
        }
    }
}
