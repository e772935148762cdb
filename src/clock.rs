//! Wall-clock sources.
//!
//! Rows and buckets are stamped from a [`Clock`] rather than from
//! `chrono::Local` directly so that hour boundaries can be driven from tests.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Local, Utc};
use std::fmt::Debug;
use std::sync::Mutex;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync + Debug {
    /// Current time with the offset that should appear in the log.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// The system clock, in local time or UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    utc: bool,
}

impl SystemClock {
    /// Local wall-clock time
    pub fn local() -> Self {
        Self { utc: false }
    }

    /// UTC wall-clock time
    pub fn utc() -> Self {
        Self { utc: true }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        if self.utc {
            Utc::now().fixed_offset()
        } else {
            Local::now().fixed_offset()
        }
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    /// Start the clock at `start`.
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start the clock at a UTC epoch second.
    pub fn at_epoch(secs: i64) -> Self {
        let start = DateTime::<Utc>::from_timestamp(secs, 0)
            .unwrap_or_default()
            .fixed_offset();
        Self::new(start)
    }

    /// Move forward by `secs` seconds.
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += ChronoDuration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
