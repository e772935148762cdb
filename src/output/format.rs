//! Value formatting
//!
//! Every configured point yields exactly one field per row, in point order:
//! a successful read renders with four decimal digits, anything else renders
//! as [`NOT_AVAILABLE`].

use crate::{PointSet, ReadResult};
use chrono::{DateTime, FixedOffset};
use tracing::warn;

/// Sentinel written for a point that could not be read
pub const NOT_AVAILABLE: &str = "N/A";

/// Digits after the decimal point for every logged value
pub const DECIMAL_DIGITS: usize = 4;

/// Layout of the human-readable timestamp column
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render a single read result.
///
/// Non-finite values have no fixed-precision form and render as
/// [`NOT_AVAILABLE`], however the result was constructed.
pub fn format_value(result: &ReadResult) -> String {
    match result {
        ReadResult::Value(v) if v.is_finite() => format!("{v:.prec$}", prec = DECIMAL_DIGITS),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// Render a batch read result against the configured points.
///
/// The output always has one entry per configured point, and entry `i`
/// always corresponds to point `i`. Results missing from a short batch render
/// as [`NOT_AVAILABLE`]; surplus results are dropped.
pub fn format_values(points: &PointSet, results: &[ReadResult]) -> Vec<String> {
    if results.len() != points.len() {
        warn!(
            expected = points.len(),
            received = results.len(),
            "Batch read returned a different number of results than configured points"
        );
    }

    (0..points.len())
        .map(|i| {
            results
                .get(i)
                .map(format_value)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        })
        .collect()
}

/// One log line: the wall-clock time of the sample plus one field per point.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    timestamp: DateTime<FixedOffset>,
    values: Vec<String>,
}

impl Row {
    /// Build a row from already formatted values.
    pub fn new(timestamp: DateTime<FixedOffset>, values: Vec<String>) -> Self {
        Self { timestamp, values }
    }

    /// Build a row by formatting a batch read result.
    pub fn from_results(
        timestamp: DateTime<FixedOffset>,
        points: &PointSet,
        results: &[ReadResult],
    ) -> Self {
        Self::new(timestamp, format_values(points, results))
    }

    /// Sample time
    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    /// Formatted value fields, one per point
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// `YYYY-MM-DD HH:MM:SS` in the timestamp's own offset
    pub fn datetime_field(&self) -> String {
        self.timestamp.format(DATETIME_FORMAT).to_string()
    }

    /// Seconds since the Unix epoch
    pub fn epoch_field(&self) -> String {
        self.timestamp.timestamp().to_string()
    }

    /// All fields of the line, timestamps first.
    pub fn fields(&self) -> Vec<String> {
        let mut fields = Vec::with_capacity(self.values.len() + 2);
        fields.push(self.datetime_field());
        fields.push(self.epoch_field());
        fields.extend(self.values.iter().cloned());
        fields
    }
}
