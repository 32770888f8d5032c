//! Index-ordered tables of records.
//!
//! A [`Dataset`] is the in-memory form of one cache entry: rows ordered by a
//! unique, strictly increasing index. The incremental synchronization
//! algorithms (overlap validation and append-only merge) live here so that
//! every dataset kind shares them.

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{Debug, Display};

use crate::error::{DataError, Result};
use crate::types::{Dividend, IndexValue, Quote, SecurityInfo};

/// Absolute tolerance used when comparing cached and fresh values.
pub const ABSOLUTE_TOLERANCE: f64 = 1e-8;

/// Relative tolerance used when comparing cached and fresh values.
pub const RELATIVE_TOLERANCE: f64 = 1e-5;

/// Returns true if `a` and `b` are equal within the dataset tolerance.
#[must_use]
pub fn approx_eq(a: f64, b: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    (a - b).abs() <= ABSOLUTE_TOLERANCE + RELATIVE_TOLERANCE * b.abs()
}

/// Like [`approx_eq`], with two missing values comparing equal.
#[must_use]
pub fn approx_eq_opt(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => approx_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// A row of a [`Dataset`].
pub trait Record: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Index type of the table.
    type Key: Ord + Clone + Debug + Display + Send + Sync;

    /// Returns the index value of this row.
    fn key(&self) -> Self::Key;

    /// Returns true if both rows carry the same values within tolerance.
    fn same_values(&self, other: &Self) -> bool;
}

/// Rows ordered by a unique, strictly increasing index.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset<R> {
    rows: Vec<R>,
}

impl<R> Default for Dataset<R> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<R: Record> Dataset<R> {
    /// Builds a table from rows in any order.
    ///
    /// # Errors
    /// Returns [`DataError::DuplicateKey`] if two rows share an index value.
    pub fn new(mut rows: Vec<R>) -> Result<Self> {
        rows.sort_by_key(|row| row.key());
        if let Some(pair) = rows.windows(2).find(|w| w[0].key() == w[1].key()) {
            return Err(DataError::DuplicateKey(pair[0].key().to_string()));
        }
        Ok(Self { rows })
    }

    /// Creates an empty table.
    #[must_use]
    pub const fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the rows in index order.
    #[must_use]
    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    /// Returns an iterator over the rows in index order.
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.rows.iter()
    }

    /// Returns an iterator over the index values.
    pub fn keys(&self) -> impl Iterator<Item = R::Key> + '_ {
        self.rows.iter().map(|row| row.key())
    }

    /// Returns the first row.
    #[must_use]
    pub fn first(&self) -> Option<&R> {
        self.rows.first()
    }

    /// Returns the last row.
    #[must_use]
    pub fn last(&self) -> Option<&R> {
        self.rows.last()
    }

    /// Looks up a row by index value.
    #[must_use]
    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.position(key).ok().map(|i| &self.rows[i])
    }

    /// Binary search for `key`: `Ok(position)` if present, else `Err(insertion point)`.
    pub fn position(&self, key: &R::Key) -> std::result::Result<usize, usize> {
        self.rows.binary_search_by(|row| row.key().cmp(key))
    }

    /// Returns the last row whose index is less than or equal to `key`.
    #[must_use]
    pub fn last_at_or_before(&self, key: &R::Key) -> Option<&R> {
        match self.position(key) {
            Ok(i) => Some(&self.rows[i]),
            Err(0) => None,
            Err(i) => Some(&self.rows[i - 1]),
        }
    }

    /// Returns the first index value where `fresh` disagrees with this table.
    ///
    /// Only index values present in both tables are compared.
    #[must_use]
    pub fn first_mismatch(&self, fresh: &Self) -> Option<R::Key> {
        fresh.rows.iter().find_map(|new| match self.get(&new.key()) {
            Some(old) if !old.same_values(new) => Some(new.key()),
            _ => None,
        })
    }

    /// Appends the rows of `fresh` whose index is not yet present.
    ///
    /// Rows present in both tables keep their cached version. Returns the
    /// merged table and the number of appended rows.
    #[must_use]
    pub fn merge(&self, fresh: &Self) -> (Self, usize) {
        let added: Vec<R> = fresh
            .rows
            .iter()
            .filter(|row| self.get(&row.key()).is_none())
            .cloned()
            .collect();
        let count = added.len();
        if count == 0 {
            return (self.clone(), 0);
        }
        let mut rows = self.rows.clone();
        rows.extend(added);
        rows.sort_by_key(|row| row.key());
        (Self { rows }, count)
    }

    /// Serializes the rows for a cache store.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if a row cannot be serialized.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.rows).map_err(|e| DataError::Parse(e.to_string()))
    }

    /// Restores a table from a cache store payload.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] on malformed payloads and
    /// [`DataError::DuplicateKey`] if the payload breaks the index invariant.
    pub fn from_json(payload: &str) -> Result<Self> {
        let rows: Vec<R> =
            serde_json::from_str(payload).map_err(|e| DataError::Parse(e.to_string()))?;
        Self::new(rows)
    }
}

impl<R: Record> IntoIterator for Dataset<R> {
    type Item = R;
    type IntoIter = std::vec::IntoIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// Converts calendar dates into a polars `Date` column.
///
/// # Errors
/// Returns [`DataError::Other`] if the cast fails.
pub fn date_column(name: &str, dates: impl IntoIterator<Item = NaiveDate>) -> Result<Column> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
        .ok_or_else(|| DataError::Other("invalid epoch".to_string()))?;
    let days: Vec<i32> = dates
        .into_iter()
        .map(|d| (d - epoch).num_days() as i32)
        .collect();
    Column::new(name.into(), days)
        .cast(&DataType::Date)
        .map_err(|e| DataError::Other(e.to_string()))
}

impl Dataset<Quote> {
    /// Returns a DataFrame with columns: date, close, volume.
    ///
    /// # Errors
    /// Returns [`DataError::Other`] if the frame cannot be built.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let closes: Vec<Option<f64>> = self.rows.iter().map(|q| q.close).collect();
        let volumes: Vec<f64> = self.rows.iter().map(|q| q.volume).collect();
        DataFrame::new(vec![
            date_column("date", self.keys())?,
            Column::new("close".into(), closes),
            Column::new("volume".into(), volumes),
        ])
        .map_err(|e| DataError::Other(e.to_string()))
    }
}

impl Dataset<IndexValue> {
    /// Returns a DataFrame with columns: date, close.
    ///
    /// # Errors
    /// Returns [`DataError::Other`] if the frame cannot be built.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let closes: Vec<f64> = self.rows.iter().map(|v| v.close).collect();
        DataFrame::new(vec![
            date_column("date", self.keys())?,
            Column::new("close".into(), closes),
        ])
        .map_err(|e| DataError::Other(e.to_string()))
    }
}

impl Dataset<Dividend> {
    /// Returns a DataFrame with columns: date, amount.
    ///
    /// # Errors
    /// Returns [`DataError::Other`] if the frame cannot be built.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let amounts: Vec<f64> = self.rows.iter().map(|d| d.amount).collect();
        DataFrame::new(vec![
            date_column("date", self.keys())?,
            Column::new("amount".into(), amounts),
        ])
        .map_err(|e| DataError::Other(e.to_string()))
    }
}

impl Dataset<SecurityInfo> {
    /// Returns a DataFrame with columns: ticker, short_name, reg_number, lot_size.
    ///
    /// # Errors
    /// Returns [`DataError::Other`] if the frame cannot be built.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let tickers: Vec<&str> = self.rows.iter().map(|s| s.ticker.as_str()).collect();
        let names: Vec<&str> = self.rows.iter().map(|s| s.short_name.as_str()).collect();
        let reg_numbers: Vec<Option<&str>> =
            self.rows.iter().map(|s| s.reg_number.as_deref()).collect();
        let lot_sizes: Vec<u32> = self.rows.iter().map(|s| s.lot_size).collect();
        DataFrame::new(vec![
            Column::new("ticker".into(), tickers),
            Column::new("short_name".into(), names),
            Column::new("reg_number".into(), reg_numbers),
            Column::new("lot_size".into(), lot_sizes),
        ])
        .map_err(|e| DataError::Other(e.to_string()))
    }
}
