//! Daily quote history.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use futures::TryStreamExt;
use moex_core::{
    Block, DataError, Dataset, Quote, RemoteSource, Request, Result, StartMarker, Ticker,
};
use tracing::{debug, instrument};

use crate::pages::{RetryPolicy, pages};

/// Quote history resource of the shares market.
const HISTORY_PATH: &str = "/history/engines/stock/markets/shares/securities";

/// A quote as reported by one board.
#[derive(Clone, Debug, PartialEq)]
pub struct BoardQuote {
    /// Board (trading mode) identifier, e.g. "TQBR".
    pub board: String,
    /// The board's quote for the day.
    pub quote: Quote,
}

/// Builds the history request for a ticker.
#[must_use]
pub fn history_request(ticker: &Ticker) -> Request {
    Request::new(format!("{HISTORY_PATH}/{ticker}.json"), "history")
}

/// Projects a history page onto board, date, close and volume.
///
/// # Errors
/// Returns [`DataError::Parse`] if a column is missing or a row has no date.
pub fn parse_history(block: &Block) -> Result<Vec<BoardQuote>> {
    let [board, date, close, volume] = block.project(["BOARDID", "TRADEDATE", "CLOSE", "VOLUME"])?;
    block
        .rows()
        .map(|row| {
            let day = row
                .date(date)?
                .ok_or_else(|| DataError::Parse("Quote without trade date".to_string()))?;
            Ok(BoardQuote {
                board: row.text(board)?.unwrap_or_default().to_string(),
                quote: Quote::new(day, row.number(close)?, row.number(volume)?.unwrap_or(0.0)),
            })
        })
        .collect()
}

/// Keeps one quote per date: the one from the board with the largest volume.
///
/// Ties keep the row seen first.
///
/// # Errors
/// Never fails in practice; the result goes through [`Dataset::new`].
pub fn canonical_quotes(rows: impl IntoIterator<Item = BoardQuote>) -> Result<Dataset<Quote>> {
    let mut best: BTreeMap<NaiveDate, BoardQuote> = BTreeMap::new();
    for row in rows {
        match best.get(&row.quote.date) {
            Some(current) if current.quote.volume >= row.quote.volume => {}
            _ => {
                best.insert(row.quote.date, row);
            }
        }
    }
    Dataset::new(best.into_values().map(|row| row.quote).collect())
}

/// Fetches all pages of a ticker's history without de-duplication.
async fn board_history(
    source: &dyn RemoteSource,
    ticker: &Ticker,
    marker: StartMarker,
    retry: RetryPolicy,
) -> Result<Vec<BoardQuote>> {
    let mut rows = Vec::new();
    let mut stream = pages(source, history_request(ticker), marker, retry);
    while let Some(block) = stream.try_next().await? {
        rows.extend(parse_history(&block)?);
    }
    Ok(rows)
}

/// Returns the canonical daily quotes of a ticker.
///
/// [`StartMarker::Beginning`] loads the whole available history and fails
/// with [`DataError::EmptyResponse`] for unknown tickers;
/// [`StartMarker::From`] loads rows dated on or after the given date.
///
/// # Errors
/// Returns transport, parse and empty-response errors.
#[instrument(skip(source, retry), fields(source = source.name()))]
pub async fn quotes(
    source: &dyn RemoteSource,
    ticker: &Ticker,
    marker: StartMarker,
    retry: RetryPolicy,
) -> Result<Dataset<Quote>> {
    let rows = board_history(source, ticker, marker, retry).await?;
    let quotes = canonical_quotes(rows)?;
    debug!(rows = quotes.len(), "Loaded quotes");
    Ok(quotes)
}

/// Returns the full history of a ticker merged with the histories of its aliases.
///
/// Securities that changed ticker keep their registration number; the old
/// tickers hold the early part of the history. Aliases without any history
/// are skipped, the primary ticker must have one.
///
/// # Errors
/// Returns transport and parse errors, and [`DataError::EmptyResponse`] if the
/// primary ticker has no history.
#[instrument(skip(source, retry), fields(source = source.name()))]
pub async fn quotes_with_aliases(
    source: &dyn RemoteSource,
    ticker: &Ticker,
    aliases: &[Ticker],
    retry: RetryPolicy,
) -> Result<Dataset<Quote>> {
    let mut rows = board_history(source, ticker, StartMarker::Beginning, retry).await?;
    for alias in aliases.iter().filter(|alias| *alias != ticker) {
        match board_history(source, alias, StartMarker::Beginning, retry).await {
            Ok(alias_rows) => rows.extend(alias_rows),
            Err(DataError::EmptyResponse { .. }) => {
                debug!(alias = %alias, "Alias has no history");
            }
            Err(e) => return Err(e),
        }
    }
    canonical_quotes(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HISTORY_COLUMNS, PagedSource, ScriptedSource, history_rows};
    use serde_json::{Value, json};
    use std::time::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1))
    }

    fn row(board: &str, day: &str, close: Value, volume: i64) -> Vec<Value> {
        vec![json!(board), json!(day), json!("GMKN"), close, json!(volume)]
    }

    #[test]
    fn test_history_request() {
        let request = history_request(&Ticker::new("mtss"));
        assert_eq!(
            request.path(),
            "/history/engines/stock/markets/shares/securities/MTSS.json"
        );
        assert_eq!(request.block(), "history");
    }

    #[test]
    fn test_board_with_max_volume_wins() {
        let block = Block::new(
            HISTORY_COLUMNS,
            vec![
                row("SMAL", "2014-06-09", json!(10_400.0), 50),
                row("TQBR", "2014-06-09", json!(10_450.0), 212_826),
                row("TQBR", "2014-06-10", json!(10_500.0), 1000),
            ],
        );

        let quotes = canonical_quotes(parse_history(&block).unwrap()).unwrap();
        assert_eq!(quotes.len(), 2);
        let first = quotes.get(&date(2014, 6, 9)).unwrap();
        assert_eq!(first.volume, 212_826.0);
        assert_eq!(first.close, Some(10_450.0));
    }

    #[test]
    fn test_missing_close_and_volume() {
        let block = Block::new(
            HISTORY_COLUMNS,
            vec![vec![
                json!("TQBR"),
                json!("2013-03-27"),
                json!("MSTT"),
                Value::Null,
                Value::Null,
            ]],
        );
        let rows = parse_history(&block).unwrap();
        assert_eq!(rows[0].quote.close, None);
        assert_eq!(rows[0].quote.volume, 0.0);
    }

    #[test]
    fn test_row_without_date_is_rejected() {
        let block = Block::new(HISTORY_COLUMNS, vec![row("TQBR", "", json!(1.0), 1)]);
        assert!(parse_history(&block).is_err());

        let block = Block::new(
            HISTORY_COLUMNS,
            vec![vec![json!("TQBR"), Value::Null, json!("X"), json!(1.0), json!(1)]],
        );
        assert!(matches!(parse_history(&block), Err(DataError::Parse(_))));
    }

    #[tokio::test]
    async fn test_quotes_across_pages() {
        let source = PagedSource::new(history_rows(237), 100);
        let quotes = quotes(&source, &Ticker::new("MTSS"), StartMarker::Beginning, fast())
            .await
            .unwrap();

        assert_eq!(quotes.len(), 237);
        assert_eq!(quotes.first().unwrap().date, date(2014, 6, 9));
        let keys: Vec<_> = quotes.keys().collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_aliases_extend_history() {
        let source = ScriptedSource::new(vec![
            // primary ticker
            Ok(Block::new(
                HISTORY_COLUMNS,
                vec![row("TQBR", "2014-06-10", json!(2.0), 10)],
            )),
            Ok(Block::default()),
            // first alias: no history at all
            Ok(Block::default()),
            // second alias: older rows plus an overlapping thin day
            Ok(Block::new(
                HISTORY_COLUMNS,
                vec![
                    row("EQBR", "2014-06-06", json!(1.0), 10),
                    row("EQBR", "2014-06-10", json!(1.9), 5),
                ],
            )),
            Ok(Block::default()),
        ]);

        let aliases = [Ticker::new("UPRO"), Ticker::new("EONR"), Ticker::new("OGK4")];
        let quotes = quotes_with_aliases(&source, &Ticker::new("UPRO"), &aliases, fast())
            .await
            .unwrap();

        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes.first().unwrap().date, date(2014, 6, 6));
        assert_eq!(quotes.get(&date(2014, 6, 10)).unwrap().close, Some(2.0));

        let paths: Vec<String> = source.requests().iter().map(|r| r.path().to_string()).collect();
        assert_eq!(paths.iter().filter(|p| p.ends_with("/UPRO.json")).count(), 2);
    }

    #[tokio::test]
    async fn test_aliases_require_primary_history() {
        let source = ScriptedSource::new(vec![Ok(Block::default())]);
        let err = quotes_with_aliases(&source, &Ticker::new("NOPE"), &[], fast())
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::EmptyResponse { .. }));
    }
}
