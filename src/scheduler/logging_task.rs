//! The logging task: one row per tick

use super::task::RecurringTask;
use super::{TickError, LOGGING_TASK};
use crate::clock::Clock;
use crate::connection::ConnectionManager;
use crate::metrics::TickMetrics;
use crate::output::{BucketKey, LogBucketManager, OutputError, Row};
use crate::{PointSet, ReadResult};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn, Instrument};

/// Samples every configured point and appends the row to the current bucket.
pub struct LoggingTask {
    manager: Arc<ConnectionManager>,
    points: PointSet,
    clock: Arc<dyn Clock>,
    buckets: Arc<Mutex<LogBucketManager>>,
    read_timeout: Duration,
}

impl LoggingTask {
    /// Create a logging task writing through `buckets`.
    pub fn new(
        manager: Arc<ConnectionManager>,
        points: PointSet,
        buckets: LogBucketManager,
        clock: Arc<dyn Clock>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            points,
            clock,
            buckets: Arc::new(Mutex::new(buckets)),
            read_timeout,
        }
    }

    /// Run one logging tick.
    ///
    /// The row's timestamp and its bucket are both taken when the tick starts,
    /// so a read that finishes after the hour changes still lands in the
    /// bucket the tick began in. Returns that bucket.
    pub async fn run_tick(&mut self) -> Result<BucketKey, TickError> {
        let now = self.clock.now();
        let bucket = LogBucketManager::resolve_bucket(&now);
        let span = tracing::info_span!("logging_tick", bucket = %bucket);

        async {
            let metrics = TickMetrics::start(LOGGING_TASK);
            let result = self.log_row(now, bucket, &metrics).await;
            metrics.record_outcome(result.is_ok());
            result.map(|()| bucket)
        }
        .instrument(span)
        .await
    }

    async fn log_row(
        &self,
        now: chrono::DateTime<chrono::FixedOffset>,
        bucket: BucketKey,
        metrics: &TickMetrics,
    ) -> Result<(), TickError> {
        let session = self.manager.session().ok_or(TickError::NoSession)?;

        let started = Instant::now();
        let results = tokio::time::timeout(self.read_timeout, session.read_batch(self.points.ids()))
            .await
            .map_err(|_| TickError::ReadTimeout(self.read_timeout))??;
        metrics.record_read(started.elapsed());

        let failed: Vec<&str> = self
            .points
            .points()
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                !results
                    .get(*i)
                    .and_then(ReadResult::value)
                    .is_some_and(f64::is_finite)
            })
            .map(|(_, point)| point.id())
            .collect();
        if !failed.is_empty() {
            warn!(
                failed = failed.len(),
                total = self.points.len(),
                points = ?failed,
                "Some points could not be read; logging N/A"
            );
        }

        let row = Row::from_results(now, &self.points, &results);
        let buckets = self.buckets.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = buckets
                .lock()
                .map_err(|e| OutputError::Poisoned(e.to_string()))?;
            guard.write_row(bucket, &row)
        })
        .await
        .map_err(|e| TickError::Join(e.to_string()))??;

        debug!("Row logged");
        Ok(())
    }
}

#[async_trait]
impl RecurringTask for LoggingTask {
    type Error = TickError;

    fn name(&self) -> &'static str {
        LOGGING_TASK
    }

    async fn tick(&mut self) -> Result<(), TickError> {
        self.run_tick().await.map(|_| ())
    }
}
