//! Value formatting and bucketed CSV output
//!
//! # Architecture
//!
//! - [`format`] - Turns a batch read into fixed-precision fields and a [`Row`]
//! - [`csv`] - Header layout and single-line CSV encoding
//! - [`bucket`] - Hour buckets ([`BucketKey`]) and the append-only files behind them ([`LogBucketManager`])

pub mod bucket;
pub mod csv;
pub mod format;

pub use bucket::{BucketKey, LogBucketManager};
pub use format::{format_value, format_values, Row, NOT_AVAILABLE};

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV encoding error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Row does not match the configured point count
    #[error("row has {actual} value fields, expected {expected}")]
    FieldCount {
        /// Configured point count
        expected: usize,
        /// Fields in the rejected row
        actual: usize,
    },

    /// The bucket manager lock was poisoned by a panicking writer
    #[error("bucket manager unavailable: {0}")]
    Poisoned(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
