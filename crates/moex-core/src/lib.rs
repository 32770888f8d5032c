#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/moex/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core records, tables and collaborator traits for MOEX market data.
//!
//! This crate provides the foundational abstractions shared by the fetchers,
//! the cache stores and the synchronization machine:
//!
//! - [`Dataset`](dataset::Dataset) - Index-ordered table with merge and validation
//! - [`RemoteSource`](source::RemoteSource) - Black-box transport returning row blocks
//! - [`CacheStore`](cache::CacheStore) - Persistence of one table per dataset and key
//! - [`DataError`](error::DataError) - Error taxonomy

/// Cache trait for persisting datasets.
pub mod cache;
/// Index-ordered tables and their synchronization algorithms.
pub mod dataset;
/// Error types for data operations.
pub mod error;
/// Return sampling frequency.
pub mod frequency;
/// Remote data source abstraction.
pub mod source;
/// Core records (Ticker, Quote, IndexValue, SecurityInfo, Dividend).
pub mod types;

// Re-export commonly used items at crate root
pub use cache::{CacheEntry, CacheStore, GLOBAL_KEY};
pub use dataset::{Dataset, Record, approx_eq, approx_eq_opt, date_column};
pub use error::{DataError, Result};
pub use frequency::ReturnFrequency;
pub use source::{Block, BlockStream, RemoteSource, Request, Row, StartMarker};
pub use types::{Dividend, DividendEvent, IndexValue, Quote, SecurityInfo, Ticker};
