#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/moex/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Cached, incrementally synchronized MOEX market data.
//!
//! This crate ties the exchange client from `moex-iss` to the stores from
//! `moex-cache`. It re-exports the core types and provides:
//!
//! - [`DataManager`] - cache lifecycle of one dataset entry
//! - [`MarketData`] - quotes, dividends, index history, securities info and derived tables
//! - [`TradingCalendar`] - T+2 settlement shift
//! - [`log_returns_with_div`] - dividend-adjusted log returns
//!
//! # Features
//!
//! - `cache-sqlite` - SQLite-based store (default)

// Core types and traits
pub use moex_core::*;

// Stores
#[cfg(feature = "cache-sqlite")]
pub use moex_cache::SqliteStore;
pub use moex_cache::InMemoryStore;

// Exchange client
pub use moex_iss::{DEFAULT_RETRY_DELAY, IssClient, RetryPolicy, TOTAL_RETURN_INDEX};

mod lookup;
mod manager;
mod market;
mod returns;
mod settlement;
mod sources;
mod table;

pub use lookup::SecurityLookup;
pub use manager::{DEFAULT_FRESHNESS, DataManager, DatasetSource, UpdatePolicy};
pub use market::{BatchReport, MarketData};
pub use returns::{RETURN_WINDOW_MONTHS, log_returns_with_div};
pub use settlement::TradingCalendar;
pub use sources::{
    DIVIDENDS, DividendsSource, INDEX, IndexSource, QUOTES, QuotesSource, SECURITIES_INFO,
    SecuritiesSource,
};
pub use table::TickerTable;

#[cfg(test)]
pub(crate) mod testing {
    //! An in-process exchange for tests.

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Mutex;

    use moex_core::{Block, DataError, RemoteSource, Request, Result};

    /// Serves fixed blocks by path.
    ///
    /// Rows are filtered by the `from` and `securities` parameters and sliced
    /// into pages by `start`, like the exchange does.
    #[derive(Debug)]
    pub(crate) struct RoutedSource {
        routes: Mutex<HashMap<String, Block>>,
        failures: Mutex<Vec<(String, usize, DataError)>>,
        page_size: usize,
        requests: Mutex<Vec<Request>>,
    }

    impl RoutedSource {
        pub(crate) fn new(page_size: usize) -> Self {
            Self {
                routes: Mutex::new(HashMap::new()),
                failures: Mutex::new(Vec::new()),
                page_size,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn route(self, path: &str, block: Block) -> Self {
            self.replace(path, block);
            self
        }

        pub(crate) fn replace(&self, path: &str, block: Block) {
            self.routes.lock().unwrap().insert(path.to_string(), block);
        }

        /// Fails the request to `path` that follows `ok_requests` served ones.
        pub(crate) fn fail_after(&self, path: &str, ok_requests: usize, error: DataError) {
            self.failures
                .lock()
                .unwrap()
                .push((path.to_string(), ok_requests, error));
        }

        fn take_failure(&self, path: &str) -> Option<DataError> {
            let mut failures = self.failures.lock().unwrap();
            let i = failures.iter().position(|(p, _, _)| p == path)?;
            if failures[i].1 == 0 {
                return Some(failures.remove(i).2);
            }
            failures[i].1 -= 1;
            None
        }

        pub(crate) fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn count(&self, path: &str) -> usize {
            self.requests().iter().filter(|r| r.path() == path).count()
        }
    }

    fn keep(block: &Block, column: &str, row: &[Value], accept: impl Fn(&str) -> bool) -> bool {
        match block.column(column) {
            Ok(i) => row[i].as_str().is_some_and(accept),
            Err(_) => true,
        }
    }

    #[async_trait]
    impl RemoteSource for RoutedSource {
        fn name(&self) -> &str {
            "routed"
        }

        async fn fetch(&self, request: &Request) -> Result<Block> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(error) = self.take_failure(request.path()) {
                return Err(error);
            }
            let block = self
                .routes
                .lock()
                .unwrap()
                .get(request.path())
                .cloned()
                .unwrap_or_default();

            let from = request.param("from");
            let securities: Option<Vec<&str>> =
                request.param("securities").map(|s| s.split(',').collect());
            let rows: Vec<Vec<Value>> = block
                .data
                .iter()
                .filter(|row| {
                    from.is_none_or(|from| keep(&block, "TRADEDATE", row, |d| d >= from))
                })
                .filter(|row| {
                    securities
                        .as_ref()
                        .is_none_or(|list| keep(&block, "SECID", row, |s| list.iter().any(|t| *t == s)))
                })
                .cloned()
                .collect();

            let start: usize = request
                .param("start")
                .unwrap_or("0")
                .parse()
                .map_err(|_| DataError::InvalidParameter("start".into()))?;
            let start = start.min(rows.len());
            let end = (start + self.page_size).min(rows.len());
            Ok(Block {
                columns: block.columns.clone(),
                data: rows[start..end].to_vec(),
            })
        }
    }

    pub(crate) fn history_path(ticker: &str) -> String {
        format!("/history/engines/stock/markets/shares/securities/{ticker}.json")
    }

    pub(crate) fn history_block(rows: &[(&str, &str, f64, i64)]) -> Block {
        Block::new(
            ["BOARDID", "TRADEDATE", "SECID", "CLOSE", "VOLUME"],
            rows.iter()
                .map(|(board, day, close, volume)| {
                    vec![json!(board), json!(day), json!("X"), json!(close), json!(volume)]
                })
                .collect(),
        )
    }

    pub(crate) fn index_path(index: &str) -> String {
        format!("/history/engines/stock/markets/index/boards/RTSI/securities/{index}.json")
    }

    pub(crate) fn index_block(rows: &[(&str, f64)]) -> Block {
        Block::new(
            ["BOARDID", "SECID", "TRADEDATE", "CLOSE"],
            rows.iter()
                .map(|(day, close)| vec![json!("RTSI"), json!("MCFTRR"), json!(day), json!(close)])
                .collect(),
        )
    }

    pub(crate) fn securities_block(rows: &[(&str, &str, Option<&str>, u32)]) -> Block {
        Block::new(
            ["SECID", "SHORTNAME", "REGNUMBER", "LOTSIZE"],
            rows.iter()
                .map(|(secid, name, reg, lot)| vec![json!(secid), json!(name), json!(reg), json!(lot)])
                .collect(),
        )
    }

    pub(crate) fn search_block(rows: &[(&str, &str)]) -> Block {
        Block::new(
            ["id", "secid", "shortname", "regnumber"],
            rows.iter()
                .enumerate()
                .map(|(i, (secid, reg))| vec![json!(i), json!(secid), json!(secid), json!(reg)])
                .collect(),
        )
    }

    pub(crate) fn dividends_block(rows: &[(&str, &str, f64)]) -> Block {
        Block::new(
            ["secid", "isin", "registryclosedate", "value", "currencyid"],
            rows.iter()
                .map(|(secid, day, value)| {
                    vec![json!(secid), json!("RU0000000000"), json!(day), json!(value), json!("RUB")]
                })
                .collect(),
        )
    }
}
