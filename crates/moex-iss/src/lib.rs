#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/moex/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! MOEX ISS data access.
//!
//! This crate provides an [`IssClient`] implementing [`RemoteSource`] from
//! `moex-core`, plus the request builders and column projections for each
//! dataset the exchange publishes.
//!
//! # Features
//!
//! - Lazy pagination over the `start` offset with retry on timeout
//! - Daily quotes with per-day board de-duplication
//! - Securities reference data, ticker aliases and dividends
//! - Index history (total return benchmark)
//!
//! # Example
//!
//! ```no_run
//! use moex_iss::{IssClient, RetryPolicy, quotes};
//! use moex_core::{StartMarker, Ticker};
//!
//! # async fn example() -> moex_core::Result<()> {
//! let client = IssClient::new()?;
//! let history = quotes(&client, &Ticker::new("MTSS"), StartMarker::Beginning, RetryPolicy::default()).await?;
//! println!("Fetched {} rows", history.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use moex_core::{Block, DataError, RemoteSource, Request, Result};
use serde_json::Value;
use tracing::{debug, instrument};

mod dividends;
mod index;
mod pages;
mod quotes;
mod securities;

pub use dividends::{dividends, dividends_request, parse_dividends};
pub use index::{TOTAL_RETURN_INDEX, index_history, index_request, parse_index};
pub use pages::{DEFAULT_RETRY_DELAY, RetryPolicy, fetch_with_retry, pages};
pub use quotes::{
    BoardQuote, canonical_quotes, history_request, parse_history, quotes, quotes_with_aliases,
};
pub use securities::{
    aliases, aliases_request, parse_securities, securities_info, securities_request,
};

/// ISS base URL.
pub const ISS_BASE_URL: &str = "https://iss.moex.com/iss";

/// Default HTTP timeout; expiring it surfaces as [`DataError::Timeout`].
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// MOEX ISS HTTP client.
///
/// Implements [`RemoteSource`]: one request, one JSON block.
#[derive(Debug, Clone)]
pub struct IssClient {
    client: reqwest::Client,
    base_url: String,
}

impl IssClient {
    /// Create a new ISS client with default settings.
    ///
    /// # Errors
    /// Returns [`DataError::Network`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| DataError::Network(e.to_string()))?;
        Ok(Self::with_client(client))
    }

    /// Create a new ISS client with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: ISS_BASE_URL.to_string(),
        }
    }

    /// Point the client at another ISS mirror.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the full URL for a request.
    #[must_use]
    pub fn url(&self, request: &Request) -> String {
        format!("{}{}", self.base_url, request)
    }
}

/// Maps a transport error, keeping timeouts retryable.
fn transport_error(url: &str, e: &reqwest::Error) -> DataError {
    if e.is_timeout() {
        DataError::Timeout(url.to_string())
    } else {
        DataError::Network(format!("{url}: {e}"))
    }
}

/// Extracts a named block from an ISS response.
fn extract_block(body: &Value, name: &str) -> Result<Block> {
    let block = body
        .get(name)
        .ok_or_else(|| DataError::Parse(format!("Response has no block {name}")))?;
    serde_json::from_value(block.clone()).map_err(|e| DataError::Parse(e.to_string()))
}

#[async_trait]
impl RemoteSource for IssClient {
    fn name(&self) -> &str {
        "MOEX ISS"
    }

    #[instrument(skip(self), fields(request = %request))]
    async fn fetch(&self, request: &Request) -> Result<Block> {
        let request = request.clone().with_param("iss.meta", "off");
        let url = self.url(&request);
        debug!("Fetching block: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(&url, &e))?;

        if !response.status().is_success() {
            return Err(DataError::Network(format!(
                "HTTP {} for {}",
                response.status(),
                url
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                DataError::Timeout(url.clone())
            } else {
                DataError::Parse(e.to_string())
            }
        })?;

        extract_block(&body, request.block())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted remote sources for tests.

    use super::*;
    use chrono::{Duration, NaiveDate};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed list of responses, one per request.
    #[derive(Debug)]
    pub(crate) struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Block>>>,
        requests: Mutex<Vec<Request>>,
    }

    impl ScriptedSource {
        pub(crate) fn new(responses: Vec<Result<Block>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch(&self, request: &Request) -> Result<Block> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Block::default()))
        }
    }

    /// Serves slices of one block according to the `start` parameter.
    #[derive(Debug)]
    pub(crate) struct PagedSource {
        block: Block,
        page_size: usize,
        requests: Mutex<Vec<Request>>,
    }

    impl PagedSource {
        pub(crate) fn new(block: Block, page_size: usize) -> Self {
            Self {
                block,
                page_size,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn offsets(&self) -> Vec<String> {
            self.requests()
                .iter()
                .filter_map(|r| r.param("start").map(str::to_string))
                .collect()
        }
    }

    #[async_trait]
    impl RemoteSource for PagedSource {
        fn name(&self) -> &str {
            "paged"
        }

        async fn fetch(&self, request: &Request) -> Result<Block> {
            self.requests.lock().unwrap().push(request.clone());
            let start: usize = request
                .param("start")
                .unwrap_or("0")
                .parse()
                .map_err(|_| DataError::InvalidParameter("start".into()))?;
            let start = start.min(self.block.len());
            let end = (start + self.page_size).min(self.block.len());
            Ok(Block {
                columns: self.block.columns.clone(),
                data: self.block.data[start..end].to_vec(),
            })
        }
    }

    pub(crate) const HISTORY_COLUMNS: [&str; 5] =
        ["BOARDID", "TRADEDATE", "SECID", "CLOSE", "VOLUME"];

    /// A history block of `n` consecutive days on the main board.
    pub(crate) fn history_rows(n: usize) -> Block {
        let start = NaiveDate::from_ymd_opt(2014, 6, 9).unwrap();
        let data = (0..n)
            .map(|i| {
                let day = start + Duration::days(i as i64);
                vec![
                    json!("TQBR"),
                    json!(day.format("%Y-%m-%d").to_string()),
                    json!("MTSS"),
                    json!(100.0 + i as f64),
                    json!(1000 + i),
                ]
            })
            .collect();
        Block::new(HISTORY_COLUMNS, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_building() {
        let client = IssClient::new().unwrap().with_base_url("http://localhost:8080/iss/");
        let request = Request::new("/securities/MTSS/dividends.json", "dividends")
            .with_param("iss.meta", "off");
        assert_eq!(
            client.url(&request),
            "http://localhost:8080/iss/securities/MTSS/dividends.json?iss.meta=off"
        );
    }

    #[test]
    fn test_extract_block() {
        let body = json!({
            "history": {
                "columns": ["TRADEDATE", "CLOSE"],
                "data": [["2018-10-05", 275.1]]
            },
            "history.cursor": {"columns": ["INDEX", "TOTAL", "PAGESIZE"], "data": [[0, 1, 100]]}
        });
        let block = extract_block(&body, "history").unwrap();
        assert_eq!(block.columns, vec!["TRADEDATE", "CLOSE"]);
        assert_eq!(block.len(), 1);

        assert!(matches!(
            extract_block(&body, "dividends"),
            Err(DataError::Parse(_))
        ));
    }

    #[test]
    fn test_provider_info() {
        let client = IssClient::new().unwrap();
        assert_eq!(client.name(), "MOEX ISS");
        assert!(client.url(&Request::new("/x.json", "x")).starts_with(ISS_BASE_URL));
    }
}
