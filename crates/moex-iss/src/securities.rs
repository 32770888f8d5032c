//! Securities reference data and ticker aliases.

use futures::TryStreamExt;
use moex_core::{
    Block, DataError, Dataset, RemoteSource, Request, Result, SecurityInfo, StartMarker, Ticker,
};
use tracing::{debug, instrument};

use crate::pages::{RetryPolicy, fetch_with_retry, pages};

/// Securities of the main shares board.
const BOARD_SECURITIES_PATH: &str = "/engines/stock/markets/shares/boards/TQBR/securities.json";

/// Security search resource.
const SEARCH_PATH: &str = "/securities.json";

/// Builds the request for the main board securities.
///
/// Without tickers every listed security is requested at once.
#[must_use]
pub fn securities_request(tickers: Option<&[Ticker]>) -> Request {
    let request = Request::new(BOARD_SECURITIES_PATH, "securities");
    match tickers {
        Some(tickers) => {
            let list: Vec<&str> = tickers.iter().map(Ticker::as_str).collect();
            request.with_param("securities", list.join(","))
        }
        None => request,
    }
}

/// Converts a lot size cell to an integer share count.
fn lot_size(value: Option<f64>, ticker: &Ticker) -> Result<u32> {
    match value {
        Some(v) if v >= 0.0 && v.fract() == 0.0 && v <= f64::from(u32::MAX) => Ok(v as u32),
        other => Err(DataError::Parse(format!(
            "Invalid lot size {other:?} for {ticker}"
        ))),
    }
}

/// Projects a securities page onto ticker, short name, registration number and lot size.
///
/// # Errors
/// Returns [`DataError::Parse`] on missing columns, tickers or lot sizes.
pub fn parse_securities(block: &Block) -> Result<Vec<SecurityInfo>> {
    let [secid, name, reg, lot] = block.project(["SECID", "SHORTNAME", "REGNUMBER", "LOTSIZE"])?;
    block
        .rows()
        .map(|row| {
            let ticker = row
                .text(secid)?
                .map(Ticker::new)
                .ok_or_else(|| DataError::Parse("Security without ticker".to_string()))?;
            let lot_size = lot_size(row.number(lot)?, &ticker)?;
            let info = SecurityInfo::new(ticker, row.text(name)?.unwrap_or_default(), lot_size);
            Ok(match row.text(reg)? {
                Some(reg_number) if !reg_number.is_empty() => info.with_reg_number(reg_number),
                _ => info,
            })
        })
        .collect()
}

/// Returns reference data for the given tickers, or for all listed securities.
///
/// # Errors
/// Returns [`DataError::RowCountMismatch`] if the exchange does not return
/// exactly one row per requested ticker, [`DataError::EmptyResponse`] if the
/// full listing is empty, and transport or parse errors.
#[instrument(skip(source, tickers, retry), fields(source = source.name()))]
pub async fn securities_info(
    source: &dyn RemoteSource,
    tickers: Option<&[Ticker]>,
    retry: RetryPolicy,
) -> Result<Dataset<SecurityInfo>> {
    let request = securities_request(tickers);
    let block = fetch_with_retry(source, &request, retry).await?;
    let rows = parse_securities(&block)?;

    match tickers {
        Some(tickers) if rows.len() != tickers.len() => {
            return Err(DataError::RowCountMismatch {
                requested: tickers.len(),
                returned: rows.len(),
            });
        }
        None if rows.is_empty() => {
            return Err(DataError::EmptyResponse {
                url: request.to_string(),
            });
        }
        _ => {}
    }

    debug!(rows = rows.len(), "Loaded securities info");
    Dataset::new(rows)
}

/// Builds the security search request for a registration number.
#[must_use]
pub fn aliases_request(reg_number: &str) -> Request {
    Request::new(SEARCH_PATH, "securities").with_param("q", reg_number)
}

/// Returns every ticker registered under `reg_number`, sorted.
///
/// The search is fuzzy, so only rows with an identical registration number
/// are kept.
///
/// # Errors
/// Returns [`DataError::EmptyResponse`] if the search finds nothing, and
/// transport or parse errors.
#[instrument(skip(source, retry), fields(source = source.name()))]
pub async fn aliases(
    source: &dyn RemoteSource,
    reg_number: &str,
    retry: RetryPolicy,
) -> Result<Vec<Ticker>> {
    let mut tickers = Vec::new();
    let mut stream = pages(source, aliases_request(reg_number), StartMarker::Beginning, retry);
    while let Some(block) = stream.try_next().await? {
        let [secid, reg] = block.project(["secid", "regnumber"])?;
        for row in block.rows() {
            if row.text(reg)? == Some(reg_number) {
                if let Some(ticker) = row.text(secid)? {
                    tickers.push(Ticker::new(ticker));
                }
            }
        }
    }
    tickers.sort();
    tickers.dedup();
    debug!(count = tickers.len(), "Resolved aliases");
    Ok(tickers)
}
