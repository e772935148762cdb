//! The keep-alive task
//!
//! Reads the diagnostic point on its own cadence so the remote side never
//! sees the session idle. A failed ping is reported and counted; only the
//! configured [`ReconnectPolicy`] can turn repeated failures into a
//! reconnection.

use super::task::RecurringTask;
use super::{KeepAliveError, KEEP_ALIVE_TASK};
use crate::config::ReconnectPolicy;
use crate::connection::{ConnectionError, ConnectionManager};
use crate::metrics::{self, TickMetrics};
use crate::shutdown::SharedShutdown;
use crate::ReadResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// Successful keep-alive pings, shared between the task and its observers.
#[derive(Debug, Clone, Default)]
pub struct PingCounter(Arc<AtomicU64>);

impl PingCounter {
    /// A counter starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Pings the diagnostic point and applies the reconnection policy.
pub struct KeepAliveTask {
    manager: Arc<ConnectionManager>,
    diagnostic_point: String,
    read_timeout: Duration,
    counter: PingCounter,
    reconnect: ReconnectPolicy,
    consecutive_failures: u32,
    shutdown: SharedShutdown,
    fatal: mpsc::Sender<ConnectionError>,
}

impl KeepAliveTask {
    /// Create a keep-alive task.
    ///
    /// `shutdown` is the scheduler's own coordinator: it interrupts a
    /// reconnection in progress and is triggered when reconnection is
    /// exhausted. The exhaustion error itself is sent on `fatal`.
    pub fn new(
        manager: Arc<ConnectionManager>,
        diagnostic_point: impl Into<String>,
        read_timeout: Duration,
        counter: PingCounter,
        reconnect: ReconnectPolicy,
        shutdown: SharedShutdown,
        fatal: mpsc::Sender<ConnectionError>,
    ) -> Self {
        Self {
            manager,
            diagnostic_point: diagnostic_point.into(),
            read_timeout,
            counter,
            reconnect,
            consecutive_failures: 0,
            shutdown,
            fatal,
        }
    }

    /// Consecutive failed pings since the last success or reconnection
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one keep-alive tick. Returns the ping count after a successful ping.
    pub async fn run_tick(&mut self) -> Result<u64, KeepAliveError> {
        let span = tracing::info_span!("keep_alive_tick", point = %self.diagnostic_point);

        async {
            let metrics = TickMetrics::start(KEEP_ALIVE_TASK);
            let result = self.ping(&metrics).await;
            metrics.record_outcome(result.is_ok());

            match result {
                Ok(value) => {
                    if self.consecutive_failures > 0 {
                        info!(
                            after_failures = self.consecutive_failures,
                            "Keep-alive recovered"
                        );
                    }
                    self.consecutive_failures = 0;
                    let count = self.counter.increment();
                    metrics::record_ping_count(count);
                    debug!(value, ping_count = count, "Keep-alive ping succeeded");
                    Ok(count)
                }
                Err(e) => {
                    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                    if self.reconnect.should_reconnect(self.consecutive_failures)
                        && !self.shutdown.is_shutdown_requested()
                    {
                        self.reconnect().await;
                    }
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn ping(&self, metrics: &TickMetrics) -> Result<f64, KeepAliveError> {
        let session = self.manager.session().ok_or(KeepAliveError::NoSession)?;

        let started = Instant::now();
        let read = tokio::time::timeout(self.read_timeout, session.read_one(&self.diagnostic_point)).await;
        metrics.record_read(started.elapsed());

        match read {
            Err(_) => Err(KeepAliveError::Timeout(self.read_timeout)),
            Ok(Err(e)) => Err(KeepAliveError::Read(e)),
            Ok(Ok(ReadResult::Failed { reason })) => Err(KeepAliveError::BadStatus {
                point: self.diagnostic_point.clone(),
                reason,
            }),
            Ok(Ok(ReadResult::Value(value))) => Ok(value),
        }
    }

    async fn reconnect(&mut self) {
        warn!(
            consecutive_failures = self.consecutive_failures,
            "Keep-alive failure threshold reached; reconnecting"
        );

        match self.manager.reconnect(&self.shutdown).await {
            Ok(_) => {
                info!("Session re-established after keep-alive failures");
                self.consecutive_failures = 0;
            }
            Err(ConnectionError::Interrupted { attempts }) => {
                info!(attempts, "Reconnection interrupted by shutdown");
            }
            Err(ConnectionError::Released) => {
                debug!("Connection manager released; not reconnecting");
            }
            Err(e) => {
                error!(error = %e, "Reconnection failed; stopping scheduler");
                if self.fatal.try_send(e).is_err() {
                    debug!("Fatal connection error already reported");
                }
                self.shutdown.request_shutdown();
            }
        }
    }
}

#[async_trait]
impl RecurringTask for KeepAliveTask {
    type Error = KeepAliveError;

    fn name(&self) -> &'static str {
        KEEP_ALIVE_TASK
    }

    async fn tick(&mut self) -> Result<(), KeepAliveError> {
        self.run_tick().await.map(|_| ())
    }
}
