//! Dividend-adjusted log returns.

use chrono::{Months, NaiveDate};
use moex_core::{DataError, DividendEvent, Result, ReturnFrequency, Ticker};
use tracing::debug;

use crate::settlement::TradingCalendar;
use crate::table::TickerTable;

/// Length of the trailing return window in months.
pub const RETURN_WINDOW_MONTHS: u32 = 12;

/// A dividend moved to the session it settles against.
#[derive(Debug)]
struct SettledDividend<'a> {
    ticker: &'a Ticker,
    session: NaiveDate,
    amount: f64,
}

fn months_before(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_sub_months(Months::new(months))
        .ok_or_else(|| DataError::InvalidParameter(format!("{date} minus {months} months")))
}

/// Returns `(previous, current)` date pairs, one per output row.
fn sample_points(
    calendar: &TradingCalendar,
    as_of: NaiveDate,
    frequency: ReturnFrequency,
) -> Result<Vec<(NaiveDate, NaiveDate)>> {
    if frequency.is_calendar_based() {
        let points = (0..=RETURN_WINDOW_MONTHS + 1)
            .rev()
            .map(|k| months_before(as_of, k))
            .collect::<Result<Vec<_>>>()?;
        return Ok(points.windows(2).map(|w| (w[0], w[1])).collect());
    }

    let window_start = months_before(as_of, RETURN_WINDOW_MONTHS)?;
    let dates = calendar.dates();
    let end = dates.partition_point(|d| *d <= as_of);
    Ok(dates[..end]
        .windows(2)
        .filter(|w| w[1] > window_start)
        .map(|w| (w[0], w[1]))
        .collect())
}

/// Computes dividend-adjusted log returns for `tickers` up to `as_of`.
///
/// Each row holds `ln((p1 + dividends) / p0)` per ticker, where `p0` and `p1`
/// are the prices at the previous and current sample point and `dividends`
/// sums the payments settling in between: a dividend counts for the row whose
/// interval `(previous, current]` contains the T+2 shift of its registry
/// close date.
///
/// With [`ReturnFrequency::Daily`] the rows are the trading sessions of the
/// last year ending at the last session on or before `as_of`, and prices are
/// taken from the session itself. With [`ReturnFrequency::Monthly`] the rows
/// are `as_of` and the twelve monthly anniversaries before it, with prices
/// carried forward from the last trade. Missing prices give missing cells.
///
/// # Errors
/// Returns [`DataError::EmptyCalendar`] if `prices` has no dates.
pub fn log_returns_with_div(
    tickers: &[Ticker],
    as_of: NaiveDate,
    prices: &TickerTable,
    dividends: &[DividendEvent],
    frequency: ReturnFrequency,
) -> Result<TickerTable> {
    let calendar = TradingCalendar::new(prices.dates().iter().copied());
    if calendar.is_empty() {
        return Err(DataError::EmptyCalendar);
    }

    let settled = dividends
        .iter()
        .filter(|event| tickers.contains(&event.ticker))
        .map(|event| {
            Ok(SettledDividend {
                ticker: &event.ticker,
                session: calendar.shift(event.date)?,
                amount: event.amount,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let price = |date: NaiveDate, ticker: &Ticker| match frequency {
        ReturnFrequency::Daily => prices.get(date, ticker),
        ReturnFrequency::Monthly => prices.last_at_or_before(date, ticker),
    };

    let points = sample_points(&calendar, as_of, frequency)?;
    let cells = points
        .iter()
        .map(|&(previous, current)| {
            tickers
                .iter()
                .map(|ticker| {
                    let p0 = price(previous, ticker)?;
                    let p1 = price(current, ticker)?;
                    let paid: f64 = settled
                        .iter()
                        .filter(|div| {
                            div.ticker == ticker && div.session > previous && div.session <= current
                        })
                        .map(|div| div.amount)
                        .sum();
                    Some(((p1 + paid) / p0).ln())
                })
                .collect()
        })
        .collect();

    debug!(rows = points.len(), tickers = tickers.len(), ?frequency, "Computed log returns");
    TickerTable::new(
        points.into_iter().map(|(_, current)| current).collect(),
        tickers.to_vec(),
        cells,
    )
}
