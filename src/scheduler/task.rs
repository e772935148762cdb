//! Recurring task driver
//!
//! Each task runs on its own interval. The tick body is awaited inside the
//! loop, so a task never has more than one tick in flight. Cadence boundaries
//! that pass while a tick is still running are skipped, never queued.

use crate::metrics;
use crate::shutdown::SharedShutdown;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Outcome of the most recent tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick completed
    Succeeded,
    /// The tick failed; the message is the error's display form
    Failed(String),
}

/// Point-in-time view of a scheduled task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    /// Task name (`logging` or `keep_alive`)
    pub name: &'static str,
    /// Cadence between ticks
    pub cadence: Duration,
    /// Whether the task runs at all
    pub enabled: bool,
    /// Ticks run so far
    pub ticks: u64,
    /// Ticks that failed
    pub failures: u64,
    /// Cadence boundaries skipped because a tick was still in flight
    pub skipped: u64,
    /// Outcome of the most recent tick
    pub last_outcome: Option<TickOutcome>,
}

impl TaskStatus {
    /// Status of a task that has not ticked yet
    pub fn new(name: &'static str, cadence: Duration, enabled: bool) -> Self {
        Self {
            name,
            cadence,
            enabled,
            ticks: 0,
            failures: 0,
            skipped: 0,
            last_outcome: None,
        }
    }

    fn record<E: fmt::Display>(&mut self, result: &Result<(), E>, skipped: u64) {
        self.ticks += 1;
        self.skipped += skipped;
        self.last_outcome = Some(match result {
            Ok(()) => TickOutcome::Succeeded,
            Err(e) => {
                self.failures += 1;
                TickOutcome::Failed(e.to_string())
            }
        });
    }
}

/// One unit of recurring work.
#[async_trait]
pub trait RecurringTask: Send + 'static {
    /// Error of a single tick; never escapes the task
    type Error: fmt::Display + Send;

    /// Name used in logs, metrics and status
    fn name(&self) -> &'static str;

    /// Run one tick to completion.
    async fn tick(&mut self) -> Result<(), Self::Error>;
}

/// Drive `task` every `cadence` until `shutdown` is requested.
///
/// The first tick fires one full cadence after the call. Shutdown is only
/// observed between ticks; an in-flight tick always runs to completion unless
/// the surrounding task is aborted.
pub async fn run_recurring<T: RecurringTask>(
    mut task: T,
    cadence: Duration,
    shutdown: SharedShutdown,
    status: watch::Sender<TaskStatus>,
) {
    let name = task.name();
    let mut interval = tokio::time::interval_at(Instant::now() + cadence, cadence);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(task = name, cadence_ms = cadence.as_millis() as u64, "Task started");

    loop {
        let scheduled = tokio::select! {
            biased;
            _ = shutdown.wait_for_shutdown() => break,
            scheduled = interval.tick() => scheduled,
        };

        let result = task.tick().await;
        if let Err(e) = &result {
            error!(task = name, error = %e, "Tick failed");
        }

        let skipped = missed_boundaries(scheduled, Instant::now(), cadence);
        if skipped > 0 {
            warn!(
                task = name,
                skipped,
                cadence_ms = cadence.as_millis() as u64,
                "Tick overran its cadence; skipping missed boundaries"
            );
            for _ in 0..skipped {
                metrics::record_skipped_tick(name);
            }
            // The interval delivers one late tick for the missed boundaries;
            // consume it so the next tick lands on the next boundary.
            interval.tick().await;
        }

        status.send_modify(|s| s.record(&result, skipped));
    }

    debug!(task = name, "Shutdown observed");
    info!(task = name, "Task stopped");
}

/// Boundaries after `scheduled` that were reached by `finished`.
pub fn missed_boundaries(scheduled: Instant, finished: Instant, cadence: Duration) -> u64 {
    if cadence.is_zero() {
        return 0;
    }
    let overrun = finished.saturating_duration_since(scheduled);
    (overrun.as_nanos() / cadence.as_nanos()) as u64
}
