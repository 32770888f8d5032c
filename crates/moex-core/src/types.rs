//! Core records for exchange market data.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Ticker`] - Exchange ticker
//! - [`Quote`] - Canonical daily close and volume
//! - [`IndexValue`] - Daily close of an index
//! - [`SecurityInfo`] - Security reference information
//! - [`Dividend`] - Dividend payment of one ticker
//! - [`DividendEvent`] - Dividend payment tagged with its ticker

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::dataset::{Record, approx_eq, approx_eq_opt};

/// An exchange ticker.
///
/// Tickers are automatically uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ticker(String);

impl Ticker {
    /// Creates a new ticker from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    /// Returns the ticker as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Ticker {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Ticker {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Ticker {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Canonical daily quote of a ticker.
///
/// When a security trades on several boards, the board with the largest
/// volume for the day provides the row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Trading date.
    pub date: NaiveDate,
    /// Close price, absent on days without trades.
    pub close: Option<f64>,
    /// Traded volume in shares.
    pub volume: f64,
}

impl Quote {
    /// Creates a new quote.
    #[must_use]
    pub const fn new(date: NaiveDate, close: Option<f64>, volume: f64) -> Self {
        Self {
            date,
            close,
            volume,
        }
    }
}

impl Record for Quote {
    type Key = NaiveDate;

    fn key(&self) -> NaiveDate {
        self.date
    }

    fn same_values(&self, other: &Self) -> bool {
        approx_eq_opt(self.close, other.close) && approx_eq(self.volume, other.volume)
    }
}

/// Daily close of an exchange index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexValue {
    /// Trading date.
    pub date: NaiveDate,
    /// Index close.
    pub close: f64,
}

impl IndexValue {
    /// Creates a new index value.
    #[must_use]
    pub const fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

impl Record for IndexValue {
    type Key = NaiveDate;

    fn key(&self) -> NaiveDate {
        self.date
    }

    fn same_values(&self, other: &Self) -> bool {
        approx_eq(self.close, other.close)
    }
}

/// Security reference information.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityInfo {
    /// Exchange ticker.
    pub ticker: Ticker,
    /// Short name, e.g. "Акрон".
    pub short_name: String,
    /// State registration number, shared by all tickers of one issue.
    pub reg_number: Option<String>,
    /// Number of shares in one lot.
    pub lot_size: u32,
}

impl SecurityInfo {
    /// Creates new security info.
    #[must_use]
    pub fn new(ticker: Ticker, short_name: impl Into<String>, lot_size: u32) -> Self {
        Self {
            ticker,
            short_name: short_name.into(),
            reg_number: None,
            lot_size,
        }
    }

    /// Sets the registration number.
    #[must_use]
    pub fn with_reg_number(mut self, reg_number: impl Into<String>) -> Self {
        self.reg_number = Some(reg_number.into());
        self
    }
}

impl Record for SecurityInfo {
    type Key = Ticker;

    fn key(&self) -> Ticker {
        self.ticker.clone()
    }

    fn same_values(&self, other: &Self) -> bool {
        self == other
    }
}

/// Dividend payment of one ticker, dated by the registry close date.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dividend {
    /// Registry close date.
    pub date: NaiveDate,
    /// Amount per share.
    pub amount: f64,
}

impl Dividend {
    /// Creates a new dividend.
    #[must_use]
    pub const fn new(date: NaiveDate, amount: f64) -> Self {
        Self { date, amount }
    }

    /// Tags this dividend with its ticker.
    #[must_use]
    pub fn event(&self, ticker: &Ticker) -> DividendEvent {
        DividendEvent {
            ticker: ticker.clone(),
            date: self.date,
            amount: self.amount,
        }
    }
}

impl Record for Dividend {
    type Key = NaiveDate;

    fn key(&self) -> NaiveDate {
        self.date
    }

    fn same_values(&self, other: &Self) -> bool {
        approx_eq(self.amount, other.amount)
    }
}

/// Dividend payment used as an input to return computations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DividendEvent {
    /// Paying ticker.
    pub ticker: Ticker,
    /// Registry close date, before settlement shifting.
    pub date: NaiveDate,
    /// Amount per share.
    pub amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_ticker_is_uppercased() {
        assert_eq!(Ticker::new("gmkn").as_str(), "GMKN");
        assert_eq!(Ticker::from("Mtss"), Ticker::new("MTSS"));
        assert_eq!("upro".parse::<Ticker>().unwrap().to_string(), "UPRO");
    }

    #[test]
    fn test_quote_tolerance() {
        let cached = Quote::new(date(2018, 9, 7), Some(2.633), 9_303_000.0);
        let fresh = Quote::new(date(2018, 9, 7), Some(2.633 + 1e-9), 9_303_000.0);
        assert!(cached.same_values(&fresh));

        let revised = Quote::new(date(2018, 9, 7), Some(2.64), 9_303_000.0);
        assert!(!cached.same_values(&revised));

        let missing = Quote::new(date(2018, 9, 7), None, 9_303_000.0);
        assert!(!cached.same_values(&missing));
        assert!(missing.same_values(&missing.clone()));
    }

    #[test]
    fn test_index_value_tolerance() {
        let cached = IndexValue::new(date(2018, 3, 2), 3273.16);
        assert_eq!(cached.key(), date(2018, 3, 2));
        assert!(cached.same_values(&IndexValue::new(date(2018, 3, 2), 3273.16 + 1e-6)));
        assert!(!cached.same_values(&IndexValue::new(date(2018, 3, 2), 3274.0)));
    }

    #[test]
    fn test_security_info_builder() {
        let info = SecurityInfo::new(Ticker::new("AKRN"), "Акрон", 1).with_reg_number("1-03-00207-A");
        assert_eq!(info.key(), Ticker::new("AKRN"));
        assert_eq!(info.reg_number.as_deref(), Some("1-03-00207-A"));
    }

    #[test]
    fn test_dividend_event() {
        let div = Dividend::new(date(2018, 10, 9), 2.6);
        let event = div.event(&Ticker::new("MTSS"));
        assert_eq!(event.ticker.as_str(), "MTSS");
        assert_eq!(event.date, div.date);
        assert_eq!(event.amount, 2.6);
    }
}
