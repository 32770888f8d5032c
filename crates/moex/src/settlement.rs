//! T+2 settlement calendar.
//!
//! A trade settles two sessions after execution, so a cash flow recorded for
//! the registry close date belongs to the session whose settlement lands on
//! that date. [`TradingCalendar::shift`] maps a date to that session.

use chrono::{Datelike, NaiveDate, Weekday};
use moex_core::{DataError, Dataset, Quote, Result};

/// Ordered, unique trading dates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TradingCalendar {
    dates: Vec<NaiveDate>,
}

fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

impl TradingCalendar {
    /// Builds a calendar from trading dates in any order.
    #[must_use]
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        let mut dates: Vec<NaiveDate> = dates.into_iter().collect();
        dates.sort_unstable();
        dates.dedup();
        Self { dates }
    }

    /// Builds a calendar from the index of a quotes table.
    #[must_use]
    pub fn from_quotes(quotes: &Dataset<Quote>) -> Self {
        Self {
            dates: quotes.keys().collect(),
        }
    }

    /// Trading dates, ascending.
    #[must_use]
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Returns the number of trading dates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Returns true if the calendar has no dates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Returns the session whose T+2 settlement falls on `date`.
    ///
    /// The session on or before `date` is located first (weekends and
    /// holidays fall back to the preceding session) and the session before it
    /// is returned. Past the last known date the calendar continues over
    /// Monday to Friday. Dates on or before the first session resolve to the
    /// first session.
    ///
    /// A holiday is shifted from its preceding session, so with sessions
    /// 2018-10-08, 2018-10-09 and 2018-10-11 the holiday 2018-10-10 resolves
    /// to 2018-10-08, not 2018-10-09.
    ///
    /// # Errors
    /// Returns [`DataError::EmptyCalendar`] if the calendar has no dates.
    pub fn shift(&self, date: NaiveDate) -> Result<NaiveDate> {
        let (first, last) = match (self.dates.first(), self.dates.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(DataError::EmptyCalendar),
        };
        if date <= first {
            return Ok(first);
        }
        if date > last {
            if let Some(session) = Self::business_day_after(last, date) {
                let previous = session
                    .pred_opt()
                    .and_then(|day| Self::business_day_after(last, day));
                return Ok(previous.unwrap_or(last));
            }
        }

        let pos = self.dates.partition_point(|d| *d <= date) - 1;
        Ok(self.dates[pos.saturating_sub(1)])
    }

    /// Returns the last business day in `(after, on_or_before]`.
    fn business_day_after(after: NaiveDate, on_or_before: NaiveDate) -> Option<NaiveDate> {
        let mut day = on_or_before;
        while day > after {
            if is_business_day(day) {
                return Some(day);
            }
            day = day.pred_opt()?;
        }
        None
    }
}
