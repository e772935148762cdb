//! Runtime configuration
//!
//! [`LoggerConfig`] is assembled by the CLI (flags or environment variables)
//! and validated before any connection attempt, so misconfigurations such as
//! a keep-alive slower than the session idle timeout never reach runtime.

use crate::connection::RetryPolicy;
use crate::PointSet;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

/// Default endpoint: the built-in simulated source
pub const DEFAULT_ENDPOINT: &str = "sim://localhost";

/// Default logging cadence
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Default keep-alive cadence
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Default remote session idle timeout
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on any single session read
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Default grace period for in-flight ticks at shutdown
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(5_000);

/// Server current time; readable on every OPC UA server
pub const DEFAULT_DIAGNOSTIC_POINT: &str = "ns=0;i=2258";

/// Number of points in the default point list
pub const DEFAULT_POINT_COUNT: usize = 10;

/// `ns=1;s=Tag1` through `ns=1;s=Tag10`
pub fn default_points() -> Vec<String> {
    (1..=DEFAULT_POINT_COUNT)
        .map(|i| format!("ns=1;s=Tag{i}"))
        .collect()
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// No endpoint configured
    #[error("endpoint address must not be empty")]
    EmptyEndpoint,

    /// No points configured
    #[error("at least one point must be configured")]
    NoPoints,

    /// A point identifier is blank
    #[error("point identifier at position {0} is empty")]
    EmptyPoint(usize),

    /// A point identifier appears twice
    #[error("point '{0}' is configured more than once")]
    DuplicatePoint(String),

    /// A point derives an empty column label
    #[error("point '{0}' has an empty column label")]
    EmptyLabel(String),

    /// Two points derive the same column label
    #[error("column label '{label}' is derived from both '{first}' and '{second}'")]
    DuplicateLabel {
        /// The shared label
        label: String,
        /// Point that claimed the label first
        first: String,
        /// Point that repeats it
        second: String,
    },

    /// A cadence is zero
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    /// Keep-alive would let the session idle out between pings
    #[error("keep-alive interval ({keep_alive:?}) must be shorter than the session timeout ({session_timeout:?})")]
    KeepAliveTooSlow {
        /// Configured keep-alive cadence
        keep_alive: Duration,
        /// Remote idle timeout
        session_timeout: Duration,
    },

    /// A read could outlast its task's cadence
    #[error("read timeout ({read_timeout:?}) must be shorter than the {task} interval ({cadence:?})")]
    ReadTimeoutTooLong {
        /// Configured read timeout
        read_timeout: Duration,
        /// Task whose cadence is violated
        task: &'static str,
        /// That task's cadence
        cadence: Duration,
    },

    /// Retry policy is unusable
    #[error("invalid retry policy: {0}")]
    InvalidRetry(String),
}

/// What the keep-alive task does about repeated ping failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Report failures and keep pinging
    #[default]
    Never,
    /// Re-establish the session after this many consecutive failures
    AfterConsecutiveFailures(NonZeroU32),
}

impl ReconnectPolicy {
    /// `0` disables reconnection; any other value is the failure threshold.
    pub fn from_threshold(threshold: u32) -> Self {
        NonZeroU32::new(threshold)
            .map(Self::AfterConsecutiveFailures)
            .unwrap_or(Self::Never)
    }

    /// Whether `consecutive_failures` should trigger a reconnection
    pub fn should_reconnect(&self, consecutive_failures: u32) -> bool {
        match self {
            Self::Never => false,
            Self::AfterConsecutiveFailures(n) => consecutive_failures >= n.get(),
        }
    }
}

/// Complete logger configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LoggerConfig {
    /// Endpoint address (`sim://...`, `http://...`)
    pub endpoint: String,
    /// Logging cadence
    pub log_interval: Duration,
    /// Keep-alive cadence
    pub keep_alive_interval: Duration,
    /// Whether the keep-alive task runs at all
    pub keep_alive_enabled: bool,
    /// Remote session idle timeout
    pub session_timeout: Duration,
    /// Bound on any single session read
    pub read_timeout: Duration,
    /// Bound on each connect / session-creation step
    pub connect_timeout: Duration,
    /// Point identifiers in column order
    pub points: Vec<String>,
    /// Point read by the keep-alive task
    pub diagnostic_point: String,
    /// Directory receiving the bucket files
    pub log_dir: PathBuf,
    /// Connection retry policy
    pub retry: RetryPolicy,
    /// Keep-alive reconnection policy
    pub reconnect: ReconnectPolicy,
    /// Stamp rows in UTC instead of local time
    pub use_utc: bool,
    /// Time allowed for in-flight ticks at shutdown
    pub shutdown_grace: Duration,
    /// Prometheus listener address, if metrics are exported
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            log_interval: DEFAULT_LOG_INTERVAL,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            keep_alive_enabled: true,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_timeout: crate::connection::DEFAULT_CONNECT_TIMEOUT,
            points: default_points(),
            diagnostic_point: DEFAULT_DIAGNOSTIC_POINT.to_string(),
            log_dir: PathBuf::from("."),
            retry: RetryPolicy::default(),
            reconnect: ReconnectPolicy::Never,
            use_utc: false,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            metrics_addr: None,
        }
    }
}

impl LoggerConfig {
    /// Check every cross-field constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }

        if self.points.is_empty() {
            return Err(ConfigError::NoPoints);
        }
        let mut seen = HashSet::with_capacity(self.points.len());
        for (i, point) in self.points.iter().enumerate() {
            if point.trim().is_empty() {
                return Err(ConfigError::EmptyPoint(i));
            }
            if !seen.insert(point.as_str()) {
                return Err(ConfigError::DuplicatePoint(point.clone()));
            }
        }
        // Labels become CSV header columns and must stay unique.
        let point_set = self.point_set();
        let mut labels: HashMap<&str, &str> = HashMap::with_capacity(self.points.len());
        for point in point_set.points() {
            if point.label().trim().is_empty() {
                return Err(ConfigError::EmptyLabel(point.id().to_string()));
            }
            if let Some(first) = labels.insert(point.label(), point.id()) {
                return Err(ConfigError::DuplicateLabel {
                    label: point.label().to_string(),
                    first: first.to_string(),
                    second: point.id().to_string(),
                });
            }
        }

        if self.log_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("log interval"));
        }
        if self.read_timeout >= self.log_interval {
            return Err(ConfigError::ReadTimeoutTooLong {
                read_timeout: self.read_timeout,
                task: "logging",
                cadence: self.log_interval,
            });
        }

        if self.keep_alive_enabled {
            if self.keep_alive_interval.is_zero() {
                return Err(ConfigError::ZeroInterval("keep-alive interval"));
            }
            if self.keep_alive_interval >= self.session_timeout {
                return Err(ConfigError::KeepAliveTooSlow {
                    keep_alive: self.keep_alive_interval,
                    session_timeout: self.session_timeout,
                });
            }
            if self.read_timeout >= self.keep_alive_interval {
                return Err(ConfigError::ReadTimeoutTooLong {
                    read_timeout: self.read_timeout,
                    task: "keep-alive",
                    cadence: self.keep_alive_interval,
                });
            }
        }

        if self.retry.max_retry == 0 {
            return Err(ConfigError::InvalidRetry(
                "max retry must be at least 1".to_string(),
            ));
        }
        if self.retry.initial_delay > self.retry.max_delay {
            return Err(ConfigError::InvalidRetry(format!(
                "initial delay ({:?}) exceeds max delay ({:?})",
                self.retry.initial_delay, self.retry.max_delay
            )));
        }

        Ok(())
    }

    /// The configured points in column order
    pub fn point_set(&self) -> PointSet {
        PointSet::from_ids(self.points.iter().map(|p| p.trim().to_string()))
    }
}
