//! Logger command line and lifecycle

use super::CliError;
use crate::config::{
    default_points, LoggerConfig, ReconnectPolicy, DEFAULT_DIAGNOSTIC_POINT, DEFAULT_ENDPOINT,
};
use crate::connection::{ConnectionError, ConnectionManager, RetryPolicy};
use crate::metrics;
use crate::scheduler::Scheduler;
use crate::session::create_connector;
use crate::shutdown::SharedShutdown;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Periodically log OPC point values to hour-bucketed CSV files
#[derive(Parser, Debug)]
#[command(name = "opc-data-logger", version, about, long_about = None)]
pub struct Cli {
    /// Endpoint address (sim://..., http://..., https://...)
    #[arg(long, env = "OPC_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Seconds between logged rows
    #[arg(long, env = "LOG_INTERVAL", default_value_t = 60)]
    pub log_interval: u64,

    /// Seconds between keep-alive reads; must be shorter than --session-timeout
    #[arg(long, env = "KEEP_ALIVE_INTERVAL", default_value_t = 15)]
    pub keep_alive_interval: u64,

    /// Idle timeout of the remote session, in seconds
    #[arg(long, env = "SESSION_TIMEOUT", default_value_t = 60)]
    pub session_timeout: u64,

    /// Bound on any single read, in milliseconds
    #[arg(long = "read-timeout", env = "READ_TIMEOUT_MS", default_value_t = 5_000)]
    pub read_timeout_ms: u64,

    /// Comma-separated point identifiers, in column order
    #[arg(long, env = "OPC_POINTS", value_delimiter = ',', default_values_t = default_points())]
    pub points: Vec<String>,

    /// Point read by the keep-alive task
    #[arg(long, env = "DIAGNOSTIC_POINT", default_value = DEFAULT_DIAGNOSTIC_POINT)]
    pub diagnostic_point: String,

    /// Directory receiving the OPC_Log_*.csv files
    #[arg(long, env = "LOG_DIR", default_value = ".")]
    pub log_dir: PathBuf,

    /// Connection attempts before giving up
    #[arg(long, env = "MAX_RETRY", default_value_t = 5)]
    pub max_retry: u32,

    /// Delay after the first failed attempt, in milliseconds
    #[arg(long = "initial-delay", env = "INITIAL_DELAY_MS", default_value_t = 2_000)]
    pub initial_delay_ms: u64,

    /// Ceiling for the delay between attempts, in milliseconds
    #[arg(long = "max-delay", env = "MAX_DELAY_MS", default_value_t = 10_000)]
    pub max_delay_ms: u64,

    /// Bound on each connect and session-creation step, in milliseconds
    #[arg(long = "connect-timeout", env = "CONNECT_TIMEOUT_MS", default_value_t = 10_000)]
    pub connect_timeout_ms: u64,

    /// Reconnect after this many consecutive failed keep-alive reads (0 = never)
    #[arg(long, env = "RECONNECT_AFTER", default_value_t = 0)]
    pub reconnect_after: u32,

    /// Do not run the keep-alive task
    #[arg(long, env = "DISABLE_KEEP_ALIVE")]
    pub no_keep_alive: bool,

    /// Stamp rows and name files in UTC instead of local time
    #[arg(long, env = "LOG_UTC")]
    pub utc: bool,

    /// Time allowed for in-flight ticks at shutdown, in milliseconds
    #[arg(long = "shutdown-grace", env = "SHUTDOWN_GRACE_MS", default_value_t = 5_000)]
    pub shutdown_grace_ms: u64,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Convert parsed arguments into a logger configuration.
    ///
    /// The result is not validated yet; see [`LoggerConfig::validate`].
    pub fn into_config(self) -> LoggerConfig {
        LoggerConfig {
            endpoint: self.endpoint.trim().to_string(),
            log_interval: Duration::from_secs(self.log_interval),
            keep_alive_interval: Duration::from_secs(self.keep_alive_interval),
            keep_alive_enabled: !self.no_keep_alive,
            session_timeout: Duration::from_secs(self.session_timeout),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            points: self.points.into_iter().map(|p| p.trim().to_string()).collect(),
            diagnostic_point: self.diagnostic_point,
            log_dir: self.log_dir,
            retry: RetryPolicy::from_millis(self.max_retry, self.initial_delay_ms, self.max_delay_ms),
            reconnect: ReconnectPolicy::from_threshold(self.reconnect_after),
            use_utc: self.utc,
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
            metrics_addr: self.metrics_addr,
        }
    }

    /// Run the logger until `shutdown` is requested.
    pub async fn execute(self, shutdown: SharedShutdown) -> Result<(), CliError> {
        run(self.into_config(), shutdown).await
    }
}

/// Run the logger: acquire the session, schedule both tasks, stop on shutdown.
///
/// Returns `Ok` on a clean, signal-triggered shutdown (including one that
/// arrives while the first connection is still being retried). Returns an
/// error for invalid configuration, exhausted connection retries, or an
/// exhausted keep-alive reconnection. The session is released on every path
/// that established it.
pub async fn run(config: LoggerConfig, shutdown: SharedShutdown) -> Result<(), CliError> {
    config.validate()?;

    if let Some(addr) = config.metrics_addr {
        metrics::init_metrics(addr).await?;
    }

    let connector = create_connector(&config.endpoint, config.read_timeout)?;
    let manager = Arc::new(
        ConnectionManager::new(connector, &config.endpoint, config.retry)
            .with_connect_timeout(config.connect_timeout),
    );

    info!(
        endpoint = %config.endpoint,
        points = config.points.len(),
        log_dir = %config.log_dir.display(),
        "Starting data logger"
    );

    match manager.acquire(&shutdown).await {
        Ok(_) => {}
        Err(ConnectionError::Interrupted { attempts }) => {
            info!(attempts, "Shutdown requested before a session was established");
            release(&manager).await;
            return Ok(());
        }
        Err(e) => {
            error!(error = %e, "Could not establish a session");
            release(&manager).await;
            return Err(e.into());
        }
    }

    let scheduler = match Scheduler::from_config(&config, manager.clone()) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            release(&manager).await;
            return Err(e.into());
        }
    };
    let mut handle = scheduler.start();

    let result = tokio::select! {
        _ = shutdown.wait_for_shutdown() => {
            info!("Shutdown requested");
            Ok(())
        }
        err = handle.fatal_error() => {
            error!(error = %err, "Scheduler stopped by a fatal connection error");
            Err(CliError::from(err))
        }
    };

    let logging_status = handle.subscribe_logging();
    let pings = handle.ping_count();
    if !handle.stop(config.shutdown_grace).await {
        warn!("Some ticks were abandoned at shutdown");
    }
    release(&manager).await;

    let logging = logging_status.borrow().clone();
    info!(
        rows_logged = logging.ticks - logging.failures,
        failed_ticks = logging.failures,
        keep_alive_pings = pings,
        "Data logger stopped"
    );
    result
}

async fn release(manager: &ConnectionManager) {
    if let Err(e) = manager.release().await {
        warn!(error = %e, "Failed to release session cleanly");
    }
}
