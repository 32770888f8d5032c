//! Date-by-ticker tables.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use moex_core::{DataError, Dataset, Quote, Result, Ticker, date_column};
use polars::prelude::*;

/// A table with one row per date and one column per ticker.
///
/// Dates are strictly increasing. Cells are missing where a ticker has no
/// value for the date.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickerTable {
    dates: Vec<NaiveDate>,
    tickers: Vec<Ticker>,
    cells: Vec<Vec<Option<f64>>>,
}

impl TickerTable {
    /// Builds a table from row-major cells.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] if the shape does not match or
    /// the dates are not strictly increasing.
    pub fn new(
        dates: Vec<NaiveDate>,
        tickers: Vec<Ticker>,
        cells: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        if cells.len() != dates.len() || cells.iter().any(|row| row.len() != tickers.len()) {
            return Err(DataError::InvalidParameter(format!(
                "Table shape does not match {} dates and {} tickers",
                dates.len(),
                tickers.len()
            )));
        }
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(DataError::InvalidParameter(
                "Table dates must be strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            dates,
            tickers,
            cells,
        })
    }

    /// Aligns one value per quote over the union of the quote dates.
    #[must_use]
    pub fn from_quotes(
        series: &[(Ticker, Dataset<Quote>)],
        value: impl Fn(&Quote) -> Option<f64>,
    ) -> Self {
        let dates: Vec<NaiveDate> = series
            .iter()
            .flat_map(|(_, quotes)| quotes.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let cells = dates
            .iter()
            .map(|date| {
                series
                    .iter()
                    .map(|(_, quotes)| quotes.get(date).and_then(&value))
                    .collect()
            })
            .collect();
        Self {
            dates,
            tickers: series.iter().map(|(ticker, _)| ticker.clone()).collect(),
            cells,
        }
    }

    /// Row dates.
    #[must_use]
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Column tickers.
    #[must_use]
    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    fn column_of(&self, ticker: &Ticker) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    /// Returns the cell at `date` for `ticker`.
    #[must_use]
    pub fn get(&self, date: NaiveDate, ticker: &Ticker) -> Option<f64> {
        let column = self.column_of(ticker)?;
        let row = self.dates.binary_search(&date).ok()?;
        self.cells[row][column]
    }

    /// Returns the last value of `ticker` on or before `date`.
    #[must_use]
    pub fn last_at_or_before(&self, date: NaiveDate, ticker: &Ticker) -> Option<f64> {
        let column = self.column_of(ticker)?;
        let end = self.dates.partition_point(|d| *d <= date);
        self.cells[..end].iter().rev().find_map(|row| row[column])
    }

    /// Returns the cells of one ticker, top to bottom.
    #[must_use]
    pub fn column(&self, ticker: &Ticker) -> Option<Vec<Option<f64>>> {
        let column = self.column_of(ticker)?;
        Some(self.cells.iter().map(|row| row[column]).collect())
    }

    /// Returns a DataFrame with a `date` column followed by one column per ticker.
    ///
    /// # Errors
    /// Returns [`DataError::Other`] if the frame cannot be built.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let mut columns = vec![date_column("date", self.dates.iter().copied())?];
        for (i, ticker) in self.tickers.iter().enumerate() {
            let values: Vec<Option<f64>> = self.cells.iter().map(|row| row[i]).collect();
            columns.push(Column::new(ticker.as_str().into(), values));
        }
        DataFrame::new(columns).map_err(|e| DataError::Other(e.to_string()))
    }
}
