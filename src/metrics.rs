//! Production observability metrics for the data logger
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Optional Prometheus exporter for a scrape endpoint (`--metrics-addr`)
//! - Recording without an installed exporter is a no-op

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(false));

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed
    #[error("failed to install Prometheus exporter on {addr}: {reason}")]
    InstallFailed {
        /// Listener address
        addr: SocketAddr,
        /// Underlying cause
        reason: String,
    },
}

/// Initialize metrics system with Prometheus exporter
///
/// Must be called from within a tokio runtime. Idempotent.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    let mut initialized = METRICS_INITIALIZED.lock().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::InstallFailed {
            addr,
            reason: e.to_string(),
        })?;

    describe_counter!(
        "logging_ticks_total",
        Unit::Count,
        "Logging ticks by outcome"
    );
    describe_counter!(
        "log_rows_written_total",
        Unit::Count,
        "Rows appended to bucket files"
    );
    describe_counter!(
        "keep_alive_pings_total",
        Unit::Count,
        "Keep-alive reads by outcome"
    );
    describe_counter!(
        "ticks_skipped_total",
        Unit::Count,
        "Cadence boundaries skipped because the previous tick was still running"
    );
    describe_counter!(
        "connection_attempts_total",
        Unit::Count,
        "Connection attempts by outcome"
    );
    describe_histogram!(
        "session_read_duration_seconds",
        Unit::Seconds,
        "Duration of session reads"
    );
    describe_gauge!(
        "keep_alive_ping_count",
        Unit::Count,
        "Successful keep-alive pings since process start"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.lock().await
}

fn outcome_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record one connection attempt
pub fn record_connection_attempt(success: bool) {
    counter!("connection_attempts_total", "outcome" => outcome_label(success)).increment(1);
}

/// Record a row appended to a bucket file
pub fn record_row_written() {
    counter!("log_rows_written_total").increment(1);
}

/// Record a skipped cadence boundary
pub fn record_skipped_tick(task: &'static str) {
    counter!("ticks_skipped_total", "task" => task).increment(1);
}

/// Record the running keep-alive count
pub fn record_ping_count(count: u64) {
    gauge!("keep_alive_ping_count").set(count as f64);
}

/// Timing and outcome of a single tick
pub struct TickMetrics {
    task: &'static str,
    start_time: Instant,
}

impl TickMetrics {
    /// Start tracking a tick of `task`
    pub fn start(task: &'static str) -> Self {
        Self {
            task,
            start_time: Instant::now(),
        }
    }

    /// Record how long the session read took
    pub fn record_read(&self, duration: Duration) {
        histogram!("session_read_duration_seconds", "task" => self.task)
            .record(duration.as_secs_f64());
    }

    /// Record the tick's outcome
    pub fn record_outcome(&self, success: bool) {
        let name = match self.task {
            "keep_alive" => "keep_alive_pings_total",
            _ => "logging_ticks_total",
        };
        counter!(name, "outcome" => outcome_label(success)).increment(1);

        debug!(
            task = self.task,
            success,
            duration_ms = self.start_time.elapsed().as_millis() as u64,
            "Tick finished"
        );
    }
}
