//! Index history.

use futures::TryStreamExt;
use moex_core::{
    Block, DataError, Dataset, IndexValue, RemoteSource, Request, Result, StartMarker, Ticker,
};
use tracing::{debug, instrument};

use crate::pages::{RetryPolicy, pages};

/// Index history resource of the RTSI board.
const INDEX_PATH: &str = "/history/engines/stock/markets/index/boards/RTSI/securities";

/// MOEX Russia total return index, used as the market benchmark.
pub const TOTAL_RETURN_INDEX: &str = "MCFTRR";

/// Builds the history request for an index.
#[must_use]
pub fn index_request(index: &Ticker) -> Request {
    Request::new(format!("{INDEX_PATH}/{index}.json"), "history")
}

/// Projects an index history page onto date and close.
///
/// # Errors
/// Returns [`DataError::Parse`] on missing columns, dates or closes.
pub fn parse_index(block: &Block) -> Result<Vec<IndexValue>> {
    let [date, close] = block.project(["TRADEDATE", "CLOSE"])?;
    block
        .rows()
        .map(|row| {
            let day = row
                .date(date)?
                .ok_or_else(|| DataError::Parse("Index value without trade date".to_string()))?;
            let value = row
                .number(close)?
                .ok_or_else(|| DataError::Parse(format!("Index value without close on {day}")))?;
            Ok(IndexValue::new(day, value))
        })
        .collect()
}

/// Returns the daily closes of an index.
///
/// Same paging rules as [`quotes`](crate::quotes): [`StartMarker::Beginning`]
/// loads the whole history and fails with [`DataError::EmptyResponse`] for
/// unknown indices, [`StartMarker::From`] loads rows on or after a date.
///
/// # Errors
/// Returns transport, parse and empty-response errors, and
/// [`DataError::DuplicateKey`] if a date is reported twice.
#[instrument(skip(source, retry), fields(source = source.name()))]
pub async fn index_history(
    source: &dyn RemoteSource,
    index: &Ticker,
    marker: StartMarker,
    retry: RetryPolicy,
) -> Result<Dataset<IndexValue>> {
    let mut rows = Vec::new();
    let mut stream = pages(source, index_request(index), marker, retry);
    while let Some(block) = stream.try_next().await? {
        rows.extend(parse_index(&block)?);
    }
    let history = Dataset::new(rows)?;
    debug!(rows = history.len(), "Loaded index history");
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PagedSource, ScriptedSource};
    use chrono::{Duration as Days, NaiveDate};
    use serde_json::{Value, json};
    use std::time::Duration;

    const COLUMNS: [&str; 4] = ["BOARDID", "SECID", "TRADEDATE", "CLOSE"];

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1))
    }

    fn row(day: NaiveDate, close: f64) -> Vec<Value> {
        vec![
            json!("RTSI"),
            json!(TOTAL_RETURN_INDEX),
            json!(day.format("%Y-%m-%d").to_string()),
            json!(close),
        ]
    }

    #[test]
    fn test_index_request() {
        let request = index_request(&Ticker::new(TOTAL_RETURN_INDEX))
            .with_param("start", 50)
            .with_param("from", "2017-10-01");
        assert_eq!(
            request.to_string(),
            "/history/engines/stock/markets/index/boards/RTSI/securities/MCFTRR.json?start=50&from=2017-10-01"
        );
        assert_eq!(request.block(), "history");
    }

    #[test]
    fn test_missing_close_is_rejected() {
        let block = Block::new(
            COLUMNS,
            vec![vec![json!("RTSI"), json!("MCFTRR"), json!("2018-03-02"), Value::Null]],
        );
        assert!(matches!(parse_index(&block), Err(DataError::Parse(_))));
    }

    #[tokio::test]
    async fn test_index_history_across_pages() {
        let start = date(2017, 10, 2);
        let block = Block::new(
            COLUMNS,
            (0..150)
                .map(|i| row(start + Days::days(i), 3000.0 + i as f64))
                .collect(),
        );
        let source = PagedSource::new(block, 100);

        let history = index_history(
            &source,
            &Ticker::new(TOTAL_RETURN_INDEX),
            StartMarker::Beginning,
            fast(),
        )
        .await
        .unwrap();

        assert_eq!(history.len(), 150);
        assert_eq!(history.first().unwrap().date, start);
        assert_eq!(source.offsets(), vec!["0", "100", "150"]);
    }

    #[tokio::test]
    async fn test_index_update_from_date() {
        let source = ScriptedSource::new(vec![
            Ok(Block::new(COLUMNS, vec![row(date(2018, 3, 2), 3273.16)])),
            Ok(Block::default()),
        ]);
        let from = StartMarker::From(date(2018, 3, 2));

        let history = index_history(&source, &Ticker::new("mcftrr"), from, fast())
            .await
            .unwrap();

        assert_eq!(history.get(&date(2018, 3, 2)).unwrap().close, 3273.16);
        assert_eq!(source.requests()[0].param("from"), Some("2018-03-02"));
    }

    #[tokio::test]
    async fn test_unknown_index() {
        let source = ScriptedSource::new(vec![Ok(Block::default())]);
        let err = index_history(&source, &Ticker::new("NOPE"), StartMarker::Beginning, fast())
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::EmptyResponse { .. }));
    }
}
