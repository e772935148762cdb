//! Hour-bucketed log files
//!
//! Every row belongs to the bucket of its sample time, truncated to the hour,
//! and every bucket maps to one file named `OPC_Log_<YYYY>-<MM>-<DD>_<HH>.csv`.
//!
//! Files are append-only. The header is written only by the call that
//! creates the file, so restarting inside an hour (or revisiting a repeated
//! local hour) never rewrites it.

use super::csv::{encode_line, header_fields};
use super::{OutputError, OutputResult, Row};
use crate::metrics;
use crate::PointSet;
use chrono::{DateTime, Datelike, TimeZone, Timelike};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Prefix shared by all log file names
pub const FILE_PREFIX: &str = "OPC_Log_";

/// Hour-granularity time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    /// Year (e.g., 2025)
    pub year: i32,
    /// Month (1-12)
    pub month: u32,
    /// Day of month (1-31)
    pub day: u32,
    /// Hour (0-23)
    pub hour: u32,
}

impl BucketKey {
    /// Truncate a timestamp to its hour, in the timestamp's own offset.
    pub fn from_datetime<Tz: TimeZone>(time: &DateTime<Tz>) -> Self {
        Self {
            year: time.year(),
            month: time.month(),
            day: time.day(),
            hour: time.hour(),
        }
    }

    /// File name for this bucket
    pub fn file_name(&self) -> String {
        format!("{FILE_PREFIX}{self}.csv")
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}_{:02}",
            self.year, self.month, self.day, self.hour
        )
    }
}

/// Creates bucket files and appends rows to them.
///
/// Owned by the logging task, which is the only writer of these files.
#[derive(Debug)]
pub struct LogBucketManager {
    dir: PathBuf,
    header: Vec<u8>,
    field_count: usize,
    current: Option<BucketKey>,
    rows_written: u64,
}

impl LogBucketManager {
    /// Create a manager writing files for `points` under `dir`.
    pub fn new<P: Into<PathBuf>>(dir: P, points: &PointSet) -> OutputResult<Self> {
        Ok(Self {
            dir: dir.into(),
            header: encode_line(header_fields(points))?,
            field_count: points.len(),
            current: None,
            rows_written: 0,
        })
    }

    /// Bucket a timestamp belongs to
    pub fn resolve_bucket<Tz: TimeZone>(now: &DateTime<Tz>) -> BucketKey {
        BucketKey::from_datetime(now)
    }

    /// Full path of a bucket's file
    pub fn path_for(&self, bucket: BucketKey) -> PathBuf {
        self.dir.join(bucket.file_name())
    }

    /// Bucket most recently written to
    pub fn current_bucket(&self) -> Option<BucketKey> {
        self.current
    }

    /// Rows appended by this manager
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Create the bucket's file with its header unless the file already exists.
    ///
    /// Returns `true` if this call created the file. An existing file is never
    /// truncated or rewritten.
    pub fn ensure_header(&mut self, bucket: BucketKey) -> OutputResult<bool> {
        if self.current != Some(bucket) {
            match self.current {
                Some(previous) => info!(from = %previous, to = %bucket, "Log bucket rolled over"),
                None => debug!(bucket = %bucket, "First log bucket"),
            }
            self.current = Some(bucket);
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| {
            OutputError::IoError(format!(
                "Failed to create directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let path = self.path_for(bucket);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => {
                return Err(OutputError::IoError(format!(
                    "Failed to create {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        if let Err(e) = write_line(&mut file, &self.header) {
            // A file without a complete header must not survive; the next
            // tick recreates it.
            drop(file);
            if let Err(remove_err) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %remove_err, "Failed to remove partially written log file");
            }
            return Err(OutputError::IoError(format!(
                "Failed to write header to {}: {}",
                path.display(),
                e
            )));
        }

        info!(path = %path.display(), "Created log file");
        Ok(true)
    }

    /// Append exactly one line for `row` to the bucket's file.
    pub fn append_row(&mut self, bucket: BucketKey, row: &Row) -> OutputResult<()> {
        if row.values().len() != self.field_count {
            return Err(OutputError::FieldCount {
                expected: self.field_count,
                actual: row.values().len(),
            });
        }

        let line = encode_line(row.fields())?;
        let path = self.path_for(bucket);

        let mut file = match open_append(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "Log file disappeared; recreating it");
                self.ensure_header(bucket)?;
                open_append(&path).map_err(|e| {
                    OutputError::IoError(format!("Failed to open {}: {}", path.display(), e))
                })?
            }
            Err(e) => {
                return Err(OutputError::IoError(format!(
                    "Failed to open {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        write_line(&mut file, &line).map_err(|e| {
            OutputError::IoError(format!("Failed to append to {}: {}", path.display(), e))
        })?;

        self.rows_written += 1;
        metrics::record_row_written();
        debug!(bucket = %bucket, rows_written = self.rows_written, "Row appended");
        Ok(())
    }

    /// Write `row` into `bucket`: create the file if needed, then append.
    pub fn write_row(&mut self, bucket: BucketKey, row: &Row) -> OutputResult<()> {
        self.ensure_header(bucket)?;
        self.append_row(bucket, row)
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().append(true).open(path)
}

/// One `write_all` per line, then flush it to stable storage.
fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    append_or_rollback(file, |f| f.write_all(line))?;
    file.sync_data()
}

/// Run `write`; if it fails, truncate the file back to its prior length so a
/// partial line never prefixes the next row.
fn append_or_rollback<F>(file: &mut File, write: F) -> std::io::Result<()>
where
    F: FnOnce(&mut File) -> std::io::Result<()>,
{
    let len = file.metadata()?.len();
    if let Err(e) = write(file) {
        if let Err(truncate_err) = file.set_len(len) {
            warn!(error = %truncate_err, "Failed to roll back partial line");
        }
        return Err(e);
    }
    Ok(())
}
