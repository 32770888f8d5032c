//! Dividend history.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use moex_core::{Block, DataError, Dataset, Dividend, RemoteSource, Request, Result, Ticker};
use tracing::{debug, instrument};

use crate::pages::{RetryPolicy, fetch_with_retry};

/// Builds the dividends request for a ticker.
#[must_use]
pub fn dividends_request(ticker: &Ticker) -> Request {
    Request::new(format!("/securities/{ticker}/dividends.json"), "dividends")
}

/// Projects a dividends block onto registry close date and amount.
///
/// Payments sharing a registry close date are summed into one row.
///
/// # Errors
/// Returns [`DataError::Parse`] on missing columns, dates or amounts.
pub fn parse_dividends(block: &Block) -> Result<Dataset<Dividend>> {
    let [date, value] = block.project(["registryclosedate", "value"])?;
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for row in block.rows() {
        let day = row
            .date(date)?
            .ok_or_else(|| DataError::Parse("Dividend without registry close date".to_string()))?;
        let amount = row
            .number(value)?
            .ok_or_else(|| DataError::Parse(format!("Dividend without amount on {day}")))?;
        *totals.entry(day).or_default() += amount;
    }
    Dataset::new(
        totals
            .into_iter()
            .map(|(day, amount)| Dividend::new(day, amount))
            .collect(),
    )
}

/// Returns the full dividend history of a ticker.
///
/// A ticker that never paid is not an error: the result is simply empty.
///
/// # Errors
/// Returns transport and parse errors.
#[instrument(skip(source, retry), fields(source = source.name()))]
pub async fn dividends(
    source: &dyn RemoteSource,
    ticker: &Ticker,
    retry: RetryPolicy,
) -> Result<Dataset<Dividend>> {
    let block = fetch_with_retry(source, &dividends_request(ticker), retry).await?;
    let dividends = parse_dividends(&block)?;
    debug!(rows = dividends.len(), "Loaded dividends");
    Ok(dividends)
}
