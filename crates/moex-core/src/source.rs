//! Remote data source abstraction.
//!
//! The exchange answers every request with named blocks of rows shaped as
//! `{"columns": [...], "data": [[...], ...]}`. A [`RemoteSource`] issues one
//! [`Request`] and returns the requested [`Block`]; it knows nothing about
//! pagination, retries or dataset semantics.

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{DataError, Result};

/// Where a paginated fetch starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StartMarker {
    /// Full history from the first available row.
    #[default]
    Beginning,
    /// Rows dated on or after the given date.
    From(NaiveDate),
}

impl StartMarker {
    /// Returns true for a full-history fetch.
    #[must_use]
    pub const fn is_full_history(&self) -> bool {
        matches!(self, Self::Beginning)
    }
}

/// Descriptor of one request against the remote source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    path: String,
    block: String,
    query: Vec<(String, String)>,
}

impl Request {
    /// Creates a request for `block` of the resource at `path`.
    #[must_use]
    pub fn new(path: impl Into<String>, block: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            block: block.into(),
            query: Vec::new(),
        }
    }

    /// Adds a query parameter, replacing an earlier one with the same name.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let name = name.into();
        let value = value.to_string();
        match self.query.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.query.push((name, value)),
        }
        self
    }

    /// Resource path relative to the source's base URL.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name of the response block holding the rows.
    #[must_use]
    pub fn block(&self) -> &str {
        &self.block
    }

    /// Query parameters in insertion order.
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Returns the value of a query parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        for (i, (name, value)) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{name}={value}")?;
        }
        Ok(())
    }
}

/// One page of rows as returned by the remote source.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Column names.
    pub columns: Vec<String>,
    /// Rows, each with one value per column.
    pub data: Vec<Vec<Value>>,
}

impl Block {
    /// Creates a block from column names and rows.
    #[must_use]
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>, data: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            data,
        }
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the block has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the position of a column.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if the column is missing.
    pub fn column(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| DataError::Parse(format!("Missing column {name}")))
    }

    /// Returns the positions of several columns, in the given order.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if any column is missing.
    pub fn project<const N: usize>(&self, names: [&str; N]) -> Result<[usize; N]> {
        let mut positions = [0; N];
        for (slot, name) in positions.iter_mut().zip(names) {
            *slot = self.column(name)?;
        }
        Ok(positions)
    }

    /// Returns an iterator over the rows.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.data.iter().map(|values| Row(values))
    }
}

/// One row of a [`Block`] with typed cell accessors.
#[derive(Clone, Copy, Debug)]
pub struct Row<'a>(&'a [Value]);

impl<'a> Row<'a> {
    fn cell(&self, i: usize) -> Result<&'a Value> {
        self.0
            .get(i)
            .ok_or_else(|| DataError::Parse(format!("Row has no column {i}")))
    }

    /// Reads a text cell; JSON null maps to `None`.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if the cell is not text.
    pub fn text(&self, i: usize) -> Result<Option<&'a str>> {
        match self.cell(i)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.as_str())),
            other => Err(DataError::Parse(format!("Expected text, got {other}"))),
        }
    }

    /// Reads a numeric cell; JSON null and empty text map to `None`.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if the cell is not a number.
    pub fn number(&self, i: usize) -> Result<Option<f64>> {
        match self.cell(i)? {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| DataError::Parse(format!("Number out of range: {n}"))),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|e| DataError::Parse(format!("Invalid number {s}: {e}"))),
            other => Err(DataError::Parse(format!("Expected number, got {other}"))),
        }
    }

    /// Reads a date cell formatted as `YYYY-MM-DD`, optionally followed by a time.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if the cell is not a date.
    pub fn date(&self, i: usize) -> Result<Option<NaiveDate>> {
        let Some(text) = self.text(i)? else {
            return Ok(None);
        };
        let day = text.get(..10).unwrap_or(text);
        NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| DataError::Parse(format!("Invalid date {text}: {e}")))
    }
}

/// A lazy, one-shot sequence of pages.
pub type BlockStream<'a> = BoxStream<'a, Result<Block>>;

/// A remote source of tabular market data.
///
/// Transport timeouts must surface as [`DataError::Timeout`] so callers can
/// tell them apart from fatal transport errors.
#[async_trait]
pub trait RemoteSource: Send + Sync + fmt::Debug {
    /// Returns the name of this source (e.g., "MOEX ISS").
    fn name(&self) -> &str;

    /// Issues one request and returns the requested block.
    async fn fetch(&self, request: &Request) -> Result<Block>;
}
