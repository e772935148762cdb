//! CSV line encoding
//!
//! Header and rows are encoded one record at a time into an in-memory buffer
//! so each line reaches the file in a single write.

use super::{OutputError, OutputResult};
use crate::PointSet;
use csv::{QuoteStyle, Terminator, WriterBuilder};

/// Header of the human-readable timestamp column
pub const DATETIME_COLUMN: &str = "Timestamp (24hr datetime)";

/// Header of the epoch timestamp column
pub const EPOCH_COLUMN: &str = "Timestamp (epochtime UTC)";

/// Header fields for a log file: two timestamp columns, then one per point.
pub fn header_fields(points: &PointSet) -> Vec<String> {
    let mut fields = Vec::with_capacity(points.len() + 2);
    fields.push(DATETIME_COLUMN.to_string());
    fields.push(EPOCH_COLUMN.to_string());
    fields.extend(points.labels().map(str::to_string));
    fields
}

/// Encode one record as a `\n`-terminated CSV line.
pub fn encode_line<I, T>(fields: I) -> OutputResult<Vec<u8>>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(256));

    writer
        .write_record(fields)
        .map_err(|e| OutputError::CsvError(format!("Failed to encode record: {e}")))?;

    writer
        .into_inner()
        .map_err(|e| OutputError::CsvError(format!("Failed to finish record: {e}")))
}
