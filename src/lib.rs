//! # OPC Data Logger Library
//!
//! Periodically samples a fixed set of numeric points from a remote industrial
//! endpoint and appends them to hour-bucketed CSV files, while a second task
//! keeps the remote session from idling out.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use opc_data_logger::config::LoggerConfig;
//! use opc_data_logger::connection::ConnectionManager;
//! use opc_data_logger::scheduler::Scheduler;
//! use opc_data_logger::session::create_connector;
//! use opc_data_logger::shutdown::ShutdownCoordinator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LoggerConfig::default();
//! config.validate()?;
//!
//! let shutdown = ShutdownCoordinator::shared();
//! let connector = create_connector(&config.endpoint, config.read_timeout)?;
//! let manager = Arc::new(ConnectionManager::new(connector, &config.endpoint, config.retry));
//! manager.acquire(&shutdown).await?;
//!
//! let handle = Scheduler::from_config(&config, manager.clone())?.start();
//! shutdown.wait_for_shutdown().await;
//! handle.stop(config.shutdown_grace).await;
//! manager.release().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`session`] - Remote source seams (`Connector`, `Connection`, `Session`) and adapters
//! - [`connection`] - Session acquisition with bounded backoff, reconnection and teardown
//! - [`output`] - Value formatting, hour buckets and append-only CSV files
//! - [`scheduler`] - The logging and keep-alive tasks sharing one session
//! - [`config`] - Validated runtime configuration
//! - [`shutdown`] - Cooperative shutdown signalling

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::fmt;
use std::sync::Arc;

/// CLI surface for the logger binary
pub mod cli;

/// Wall-clock sources
pub mod clock;

/// Runtime configuration and validation
pub mod config;

/// Session acquisition, reconnection and teardown
pub mod connection;

/// Prometheus-compatible metrics
pub mod metrics;

/// Value formatting and bucketed CSV output
pub mod output;

/// Logging and keep-alive tasks
pub mod scheduler;

/// Remote source interface and adapters
pub mod session;

/// Graceful shutdown coordination shared across tasks
pub mod shutdown;

pub use config::LoggerConfig;
pub use connection::{ConnectionError, ConnectionManager};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use session::{Connection, Connector, Session, SessionError};

/// A configured data point.
///
/// The ordinal is the point's position in the configured list and fixes its
/// CSV column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Point {
    id: String,
    label: String,
    ordinal: usize,
}

impl Point {
    /// Create a point at `ordinal`, deriving its column label from the id.
    pub fn new(id: impl Into<String>, ordinal: usize) -> Self {
        let id = id.into();
        let label = label_for(&id);
        Self { id, label, ordinal }
    }

    /// Identifier sent to the remote source (e.g. `ns=1;s=Tag1`)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Column label used in the CSV header (e.g. `Tag1`)
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Zero-based column position
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.id, self.ordinal)
    }
}

/// String identifiers keep the part after the last `s=`; anything else is used verbatim.
fn label_for(id: &str) -> String {
    match id.rfind("s=") {
        Some(pos) if pos == 0 || id[..pos].ends_with(';') => id[pos + 2..].to_string(),
        _ => id.to_string(),
    }
}

/// The ordered, immutable set of points sampled on every logging tick.
///
/// Cloning is cheap; the logging task and the scheduler share one allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    points: Arc<[Point]>,
    ids: Arc<[String]>,
}

impl PointSet {
    /// Build a point set from identifiers in column order.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let points: Vec<Point> = ids
            .into_iter()
            .enumerate()
            .map(|(ordinal, id)| Point::new(id, ordinal))
            .collect();
        let ids: Vec<String> = points.iter().map(|p| p.id.clone()).collect();

        Self {
            points: points.into(),
            ids: ids.into(),
        }
    }

    /// Number of configured points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no points are configured
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points in column order
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Identifiers in column order, as passed to [`Session::read_batch`]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Column labels in column order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.points.iter().map(Point::label)
    }
}

/// Outcome of reading a single point.
///
/// A read either produced a numeric value or failed; never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    /// The point was read successfully
    Value(f64),
    /// The point could not be read (bad status, unknown node, ...)
    Failed {
        /// Status or reason reported by the source
        reason: String,
    },
}

impl ReadResult {
    /// Convenience constructor for a failed read
    pub fn failed(reason: impl Into<String>) -> Self {
        ReadResult::Failed {
            reason: reason.into(),
        }
    }

    /// The numeric value, if the read succeeded
    pub fn value(&self) -> Option<f64> {
        match self {
            ReadResult::Value(v) => Some(*v),
            ReadResult::Failed { .. } => None,
        }
    }

    /// Whether the read succeeded
    pub fn is_value(&self) -> bool {
        matches!(self, ReadResult::Value(_))
    }
}

impl From<f64> for ReadResult {
    /// Non-finite numbers are not representable in the log and count as failures.
    fn from(value: f64) -> Self {
        if value.is_finite() {
            ReadResult::Value(value)
        } else {
            ReadResult::failed(format!("non-finite value {value}"))
        }
    }
}
