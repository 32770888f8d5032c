//! Paginated fetching with retry on timeout.
//!
//! The ISS answers large requests in pages (usually 100 rows). [`pages`]
//! turns one logical request into a lazy stream of pages, advancing the
//! `start` offset by the size of each page and stopping at the first empty
//! one.

use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use moex_core::{Block, BlockStream, DataError, RemoteSource, Request, Result, StartMarker};
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, warn};

/// Default wait before repeating a request that timed out.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// How timed-out requests are repeated.
///
/// A timeout is followed by a fixed wait and the same request again, with no
/// cap on the number of attempts. Any other error ends the fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy waiting `delay` between attempts.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Returns the wait between attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }
}

/// Issues `request`, repeating it after every timeout.
///
/// # Errors
/// Returns the first non-timeout error of the source.
pub async fn fetch_with_retry(
    source: &dyn RemoteSource,
    request: &Request,
    retry: RetryPolicy,
) -> Result<Block> {
    RetryIf::spawn(
        FixedInterval::new(retry.delay()),
        || source.fetch(request),
        |e: &DataError| {
            let timed_out = e.is_timeout();
            if timed_out {
                warn!(
                    source = source.name(),
                    request = %request,
                    delay = ?retry.delay(),
                    "Request timed out, retrying"
                );
            }
            timed_out
        },
    )
    .await
}

/// Returns the pages of `request` as a lazy, one-shot stream.
///
/// Pages are requested one at a time as the stream is polled. A full-history
/// fetch whose first page is empty yields [`DataError::EmptyResponse`]; any
/// other empty page ends the stream. The stream ends after its first error.
pub fn pages<'a>(
    source: &'a dyn RemoteSource,
    request: Request,
    marker: StartMarker,
    retry: RetryPolicy,
) -> BlockStream<'a> {
    let request = match marker {
        StartMarker::Beginning => request,
        StartMarker::From(date) => request.with_param("from", date.format("%Y-%m-%d")),
    };

    stream::try_unfold(0usize, move |offset| {
        let page = request.clone().with_param("start", offset);
        async move {
            let block = fetch_with_retry(source, &page, retry).await?;
            if block.is_empty() {
                if offset == 0 && marker.is_full_history() {
                    return Err(DataError::EmptyResponse {
                        url: page.to_string(),
                    });
                }
                debug!(request = %page, rows = offset, "Pagination finished");
                return Ok(None);
            }
            let next = offset + block.len();
            Ok(Some((block, next)))
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PagedSource, ScriptedSource, history_rows};
    use chrono::NaiveDate;
    use futures::TryStreamExt;

    fn fast() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_pagination_stops_at_empty_page() {
        let source = PagedSource::new(history_rows(237), 100);
        let request = Request::new("/history/MTSS.json", "history");

        let blocks: Vec<Block> = pages(&source, request, StartMarker::Beginning, fast())
            .try_collect()
            .await
            .unwrap();

        let sizes: Vec<usize> = blocks.iter().map(Block::len).collect();
        assert_eq!(sizes, vec![100, 100, 37]);
        assert_eq!(source.offsets(), vec!["0", "100", "200", "237"]);
    }

    #[tokio::test]
    async fn test_pages_are_lazy() {
        let source = PagedSource::new(history_rows(237), 100);
        let request = Request::new("/history/MTSS.json", "history");

        let mut stream = pages(&source, request, StartMarker::Beginning, fast());
        assert!(source.offsets().is_empty());
        let first = stream.try_next().await.unwrap().unwrap();
        assert_eq!(first.len(), 100);
        assert_eq!(source.offsets(), vec!["0"]);
    }

    #[tokio::test]
    async fn test_empty_first_page_of_full_history_is_an_error() {
        let source = PagedSource::new(Block::default(), 100);
        let request = Request::new("/history/NOPE.json", "history");

        let err = pages(&source, request, StartMarker::Beginning, fast())
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::EmptyResponse { ref url } if url.contains("NOPE")));
    }

    #[tokio::test]
    async fn test_empty_first_page_of_update_is_end_of_data() {
        let source = PagedSource::new(Block::default(), 100);
        let request = Request::new("/history/MTSS.json", "history");
        let from = StartMarker::From(NaiveDate::from_ymd_opt(2018, 10, 8).unwrap());

        let blocks: Vec<Block> = pages(&source, request, from, fast())
            .try_collect()
            .await
            .unwrap();
        assert!(blocks.is_empty());
        assert_eq!(source.requests()[0].param("from"), Some("2018-10-08"));
    }

    #[tokio::test]
    async fn test_timeout_repeats_the_same_request() {
        let source = ScriptedSource::new(vec![
            Err(DataError::Timeout("slow".into())),
            Err(DataError::Timeout("slow".into())),
            Ok(Block::new(["A"], vec![vec![serde_json::json!(1)]])),
        ]);
        let request = Request::new("/x.json", "x").with_param("start", 200);

        let block = fetch_with_retry(&source, &request, fast()).await.unwrap();
        assert_eq!(block.len(), 1);

        let seen = source.requests();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|r| *r == request));
    }

    #[tokio::test]
    async fn test_other_errors_abort_the_fetch() {
        let source = ScriptedSource::new(vec![
            Ok(Block::new(["A"], vec![vec![serde_json::json!(1)]])),
            Err(DataError::Network("HTTP 500".into())),
            Ok(Block::default()),
        ]);
        let request = Request::new("/x.json", "x");

        let mut stream = pages(&source, request, StartMarker::Beginning, fast());
        assert!(stream.try_next().await.unwrap().is_some());
        assert!(matches!(
            stream.try_next().await,
            Err(DataError::Network(_))
        ));
        assert!(stream.try_next().await.unwrap().is_none());
        assert_eq!(source.requests().len(), 2);
    }
}
