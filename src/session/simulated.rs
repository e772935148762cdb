//! In-process simulated source
//!
//! Serves deterministic values so the logger can run without a plant:
//! a point whose id ends in a number `n` reads as `10 * n` plus a slow sine
//! wobble; other ids use their position in the request instead of `n`.
//! Any point listed as failing reads as a bad status.

use super::{Connection, Connector, Session, SessionError, SessionResult};
use crate::ReadResult;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Amplitude of the time-varying component added to every value
const WOBBLE_AMPLITUDE: f64 = 0.5;

/// Connector for `sim://` endpoints
#[derive(Debug, Clone, Default)]
pub struct SimulatedConnector {
    failing: Arc<HashSet<String>>,
}

impl SimulatedConnector {
    /// Make reads of `point_ids` report a bad status.
    pub fn with_failing_points<I, S>(point_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failing: Arc::new(point_ids.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl Connector for SimulatedConnector {
    async fn connect(&self, endpoint: &str) -> SessionResult<Arc<dyn Connection>> {
        debug!(endpoint = %endpoint, "Opening simulated connection");
        Ok(Arc::new(SimulatedConnection {
            failing: self.failing.clone(),
            connected: AtomicBool::new(true),
        }))
    }
}

struct SimulatedConnection {
    failing: Arc<HashSet<String>>,
    connected: AtomicBool,
}

#[async_trait]
impl Connection for SimulatedConnection {
    async fn create_session(&self) -> SessionResult<Arc<dyn Session>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SessionError::SessionRejected(
                "connection is closed".to_string(),
            ));
        }
        Ok(Arc::new(SimulatedSession {
            failing: self.failing.clone(),
            open: AtomicBool::new(true),
        }))
    }

    async fn disconnect(&self) -> SessionResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// A simulated session
pub struct SimulatedSession {
    failing: Arc<HashSet<String>>,
    open: AtomicBool,
}

impl SimulatedSession {
    fn ensure_open(&self) -> SessionResult<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SessionError::Closed)
        }
    }

    fn sample(&self, point_id: &str, position: usize, now_secs: f64) -> ReadResult {
        if self.failing.contains(point_id) {
            return ReadResult::failed("BadNodeIdUnknown");
        }
        let base = trailing_number(point_id).unwrap_or(position as u64 + 1) as f64 * 10.0;
        ReadResult::from(base + WOBBLE_AMPLITUDE * (now_secs / 60.0).sin())
    }
}

#[async_trait]
impl Session for SimulatedSession {
    async fn read_batch(&self, point_ids: &[String]) -> SessionResult<Vec<ReadResult>> {
        self.ensure_open()?;
        let now_secs = Utc::now().timestamp() as f64;
        Ok(point_ids
            .iter()
            .enumerate()
            .map(|(position, id)| self.sample(id, position, now_secs))
            .collect())
    }

    /// The diagnostic read reports the simulated server's current epoch second.
    async fn read_one(&self, point_id: &str) -> SessionResult<ReadResult> {
        self.ensure_open()?;
        if self.failing.contains(point_id) {
            return Ok(ReadResult::failed("BadNodeIdUnknown"));
        }
        Ok(ReadResult::Value(Utc::now().timestamp() as f64))
    }

    async fn close(&self) -> SessionResult<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

fn trailing_number(id: &str) -> Option<u64> {
    let digits_start = id
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    id[digits_start..].parse().ok()
}
