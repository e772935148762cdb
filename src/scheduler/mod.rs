//! Logging and keep-alive scheduling
//!
//! The [`Scheduler`] runs two independently paced tasks against the session
//! held by a [`ConnectionManager`]:
//!
//! 1. **Logging** ([`LoggingTask`]): every `log_interval`, read all points
//!    and append one row to the current hour bucket.
//! 2. **Keep-alive** ([`KeepAliveTask`]): every `keep_alive_interval`, read
//!    the diagnostic point so the remote session never idles out.
//!
//! Each task has at most one tick in flight. Tick errors are logged and
//! counted in the task's [`TaskStatus`] but never stop the task or affect
//! the other one.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use opc_data_logger::connection::{ConnectionManager, RetryPolicy};
//! use opc_data_logger::scheduler::Scheduler;
//! use opc_data_logger::session::simulated::SimulatedConnector;
//! use opc_data_logger::shutdown::ShutdownCoordinator;
//! use opc_data_logger::PointSet;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = Arc::new(SimulatedConnector::default());
//! let manager = Arc::new(ConnectionManager::new(connector, "sim://demo", RetryPolicy::default()));
//! manager.acquire(&ShutdownCoordinator::new()).await?;
//!
//! let points = PointSet::from_ids(["ns=1;s=Tag1", "ns=1;s=Tag2"]);
//! let handle = Scheduler::new(manager.clone(), points, "./logs")?
//!     .with_log_interval(Duration::from_secs(5))
//!     .start();
//!
//! tokio::time::sleep(Duration::from_secs(30)).await;
//! handle.stop(Duration::from_secs(5)).await;
//! manager.release().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Components
//!
//! - [`task`] - Recurring task driver and status snapshots
//! - [`logging_task`] - Batched reads appended to hour buckets
//! - [`keep_alive`] - Diagnostic pings and the reconnection policy

pub mod keep_alive;
pub mod logging_task;
pub mod task;

pub use keep_alive::{KeepAliveTask, PingCounter};
pub use logging_task::LoggingTask;
pub use task::{TaskStatus, TickOutcome};

use crate::clock::{Clock, SystemClock};
use crate::config::{
    LoggerConfig, ReconnectPolicy, DEFAULT_DIAGNOSTIC_POINT, DEFAULT_KEEP_ALIVE_INTERVAL,
    DEFAULT_LOG_INTERVAL, DEFAULT_READ_TIMEOUT,
};
use crate::connection::{ConnectionError, ConnectionManager};
use crate::output::{LogBucketManager, OutputError, OutputResult};
use crate::session::SessionError;
use crate::shutdown::{SharedShutdown, ShutdownCoordinator};
use crate::PointSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Name of the logging task in logs, metrics and status
pub const LOGGING_TASK: &str = "logging";

/// Name of the keep-alive task in logs, metrics and status
pub const KEEP_ALIVE_TASK: &str = "keep_alive";

/// Failure of a single logging tick
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The batch read failed as a whole
    #[error("batch read failed: {0}")]
    Read(#[from] SessionError),

    /// The batch read did not finish in time
    #[error("batch read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// No session is currently established
    #[error("no session established")]
    NoSession,

    /// The row could not be written
    #[error("failed to write row: {0}")]
    Output(#[from] OutputError),

    /// The blocking write task panicked or was cancelled
    #[error("write task failed: {0}")]
    Join(String),
}

/// Failure of a single keep-alive ping
#[derive(Debug, thiserror::Error)]
pub enum KeepAliveError {
    /// The read request failed
    #[error("keep-alive read failed: {0}")]
    Read(#[from] SessionError),

    /// The read did not finish in time
    #[error("keep-alive read timed out after {0:?}")]
    Timeout(Duration),

    /// The diagnostic point returned a bad status
    #[error("diagnostic point {point} returned bad status: {reason}")]
    BadStatus {
        /// Diagnostic point identifier
        point: String,
        /// Status reported by the source
        reason: String,
    },

    /// No session is currently established
    #[error("no session established")]
    NoSession,
}

/// Configures and starts the two recurring tasks.
pub struct Scheduler {
    manager: Arc<ConnectionManager>,
    points: PointSet,
    buckets: LogBucketManager,
    clock: Arc<dyn Clock>,
    log_interval: Duration,
    keep_alive_interval: Duration,
    keep_alive_enabled: bool,
    read_timeout: Duration,
    diagnostic_point: String,
    reconnect: ReconnectPolicy,
    ping_counter: PingCounter,
}

impl Scheduler {
    /// Create a scheduler with default cadences, writing buckets under `log_dir`.
    pub fn new(
        manager: Arc<ConnectionManager>,
        points: PointSet,
        log_dir: impl Into<PathBuf>,
    ) -> OutputResult<Self> {
        let buckets = LogBucketManager::new(log_dir, &points)?;
        Ok(Self {
            manager,
            points,
            buckets,
            clock: Arc::new(SystemClock::local()),
            log_interval: DEFAULT_LOG_INTERVAL,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            keep_alive_enabled: true,
            read_timeout: DEFAULT_READ_TIMEOUT,
            diagnostic_point: DEFAULT_DIAGNOSTIC_POINT.to_string(),
            reconnect: ReconnectPolicy::Never,
            ping_counter: PingCounter::new(),
        })
    }

    /// Create a scheduler from a validated configuration.
    pub fn from_config(config: &LoggerConfig, manager: Arc<ConnectionManager>) -> OutputResult<Self> {
        let clock: Arc<dyn Clock> = if config.use_utc {
            Arc::new(SystemClock::utc())
        } else {
            Arc::new(SystemClock::local())
        };

        Ok(Self::new(manager, config.point_set(), &config.log_dir)?
            .with_clock(clock)
            .with_log_interval(config.log_interval)
            .with_keep_alive_interval(config.keep_alive_interval)
            .with_keep_alive_enabled(config.keep_alive_enabled)
            .with_read_timeout(config.read_timeout)
            .with_diagnostic_point(config.diagnostic_point.clone())
            .with_reconnect_policy(config.reconnect))
    }

    /// Stamp rows and resolve buckets from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the logging cadence.
    pub fn with_log_interval(mut self, interval: Duration) -> Self {
        self.log_interval = interval;
        self
    }

    /// Set the keep-alive cadence.
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Enable or disable the keep-alive task.
    pub fn with_keep_alive_enabled(mut self, enabled: bool) -> Self {
        self.keep_alive_enabled = enabled;
        self
    }

    /// Bound every session read by `timeout`.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Point read by the keep-alive task.
    pub fn with_diagnostic_point(mut self, point: impl Into<String>) -> Self {
        self.diagnostic_point = point.into();
        self
    }

    /// What repeated keep-alive failures should trigger.
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Spawn both tasks. Must be called from within a tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let shutdown = ShutdownCoordinator::shared();
        let (fatal_tx, fatal_rx) = mpsc::channel(1);
        let mut tasks = Vec::with_capacity(2);

        let (logging_tx, logging_status) =
            watch::channel(TaskStatus::new(LOGGING_TASK, self.log_interval, true));
        let logging = LoggingTask::new(
            self.manager.clone(),
            self.points,
            self.buckets,
            self.clock,
            self.read_timeout,
        );
        tasks.push((
            LOGGING_TASK,
            tokio::spawn(task::run_recurring(
                logging,
                self.log_interval,
                shutdown.clone(),
                logging_tx,
            )),
        ));

        let (keep_alive_tx, keep_alive_status) = watch::channel(TaskStatus::new(
            KEEP_ALIVE_TASK,
            self.keep_alive_interval,
            self.keep_alive_enabled,
        ));
        if self.keep_alive_enabled {
            let keep_alive = KeepAliveTask::new(
                self.manager,
                self.diagnostic_point,
                self.read_timeout,
                self.ping_counter.clone(),
                self.reconnect,
                shutdown.clone(),
                fatal_tx,
            );
            tasks.push((
                KEEP_ALIVE_TASK,
                tokio::spawn(task::run_recurring(
                    keep_alive,
                    self.keep_alive_interval,
                    shutdown.clone(),
                    keep_alive_tx,
                )),
            ));
        } else {
            info!("Keep-alive disabled");
        }

        info!(
            log_interval_ms = self.log_interval.as_millis() as u64,
            keep_alive_interval_ms = self.keep_alive_interval.as_millis() as u64,
            keep_alive_enabled = self.keep_alive_enabled,
            "Scheduler started"
        );

        SchedulerHandle {
            shutdown,
            tasks,
            logging_status,
            keep_alive_status,
            ping_counter: self.ping_counter,
            fatal_rx,
        }
    }
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    shutdown: SharedShutdown,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    logging_status: watch::Receiver<TaskStatus>,
    keep_alive_status: watch::Receiver<TaskStatus>,
    ping_counter: PingCounter,
    fatal_rx: mpsc::Receiver<ConnectionError>,
}

impl SchedulerHandle {
    /// Latest logging task status
    pub fn logging_status(&self) -> TaskStatus {
        self.logging_status.borrow().clone()
    }

    /// Latest keep-alive task status
    pub fn keep_alive_status(&self) -> TaskStatus {
        self.keep_alive_status.borrow().clone()
    }

    /// Watch logging task status updates
    pub fn subscribe_logging(&self) -> watch::Receiver<TaskStatus> {
        self.logging_status.clone()
    }

    /// Successful keep-alive pings so far
    pub fn ping_count(&self) -> u64 {
        self.ping_counter.get()
    }

    /// Whether the tasks have been told to stop
    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_shutdown_requested()
    }

    /// Resolve with the error that stopped the scheduler, if one ever does.
    ///
    /// Only an exhausted keep-alive reconnection produces one. Never resolves
    /// otherwise.
    pub async fn fatal_error(&mut self) -> ConnectionError {
        match self.fatal_rx.recv().await {
            Some(err) => err,
            None => std::future::pending().await,
        }
    }

    /// Stop scheduling new ticks and wait up to `grace` for in-flight ticks.
    ///
    /// Tasks still running after `grace` are aborted. Returns `true` if every
    /// task finished on its own.
    pub async fn stop(self, grace: Duration) -> bool {
        self.shutdown.request_shutdown();
        info!(grace_ms = grace.as_millis() as u64, "Stopping scheduler");

        let deadline = tokio::time::Instant::now() + grace;
        let mut clean = true;

        for (name, mut handle) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(task = name, error = %e, "Task ended abnormally");
                    clean = false;
                }
                Err(_) => {
                    warn!(task = name, "In-flight tick exceeded shutdown grace; aborting");
                    handle.abort();
                    let _ = handle.await;
                    clean = false;
                }
            }
        }

        info!(clean, "Scheduler stopped");
        clean
    }
}
