//! Session acquisition and teardown
//!
//! [`ConnectionManager`] owns the one live session of the process. It
//! establishes it with bounded backoff, hands out shared references to the
//! scheduler's tasks, can replace it when the keep-alive policy asks for a
//! reconnection, and releases it exactly once on shutdown.
//!
//! # Components
//!
//! - [`backoff`] - Retry policy and delay calculation
//! - [`retry_formatter`] - Operator-facing retry messages

pub mod backoff;
pub mod retry_formatter;

pub use backoff::RetryPolicy;

use crate::metrics;
use crate::session::{Connection, Connector, Session, SessionError};
use crate::shutdown::ShutdownCoordinator;
use retry_formatter::RetryContext;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default bound on a single connect or session-creation step
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Session acquisition errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Every attempt allowed by the retry policy failed
    #[error("failed to establish a session with {endpoint} after {attempts} attempts: {source}")]
    Exhausted {
        /// Endpoint address
        endpoint: String,
        /// Attempts made
        attempts: u32,
        /// Error from the last attempt
        #[source]
        source: SessionError,
    },

    /// Shutdown was requested while waiting to retry
    #[error("connection attempts interrupted by shutdown after {attempts} attempts")]
    Interrupted {
        /// Attempts made before the interruption
        attempts: u32,
    },

    /// The manager was already released
    #[error("connection manager already released")]
    Released,
}

/// Errors raised while tearing the session down
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// Session close failed
    #[error("failed to close session: {0}")]
    CloseFailed(#[source] SessionError),

    /// Transport disconnect failed
    #[error("failed to disconnect: {0}")]
    DisconnectFailed(#[source] SessionError),

    /// A teardown step did not finish in time
    #[error("{step} did not complete within {limit:?}")]
    TimedOut {
        /// Step that hung
        step: &'static str,
        /// Bound that elapsed
        limit: Duration,
    },
}

#[derive(Clone)]
struct ActiveSession {
    connection: Arc<dyn Connection>,
    session: Arc<dyn Session>,
}

/// Owns the process's session to the remote endpoint.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    endpoint: String,
    policy: RetryPolicy,
    connect_timeout: Duration,
    active: RwLock<Option<ActiveSession>>,
    // Serializes acquire, reconnect and release against each other.
    lifecycle: tokio::sync::Mutex<()>,
    released: AtomicBool,
    attempts: AtomicU32,
}

impl ConnectionManager {
    /// Create a manager for `endpoint`. No connection is made until [`acquire`](Self::acquire).
    pub fn new(connector: Arc<dyn Connector>, endpoint: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            endpoint: endpoint.into(),
            policy,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            active: RwLock::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            released: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
        }
    }

    /// Bound each connect and teardown step by `timeout`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Endpoint address this manager connects to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Total connection attempts made so far, across acquire and reconnect
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The current session, if one is established.
    pub fn session(&self) -> Option<Arc<dyn Session>> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|active| active.session.clone())
    }

    /// Establish the session, retrying per the policy.
    ///
    /// Returns the existing session if one is already established. Fails with
    /// [`ConnectionError::Exhausted`] once `max_retry` attempts have failed.
    pub async fn acquire(
        &self,
        shutdown: &ShutdownCoordinator,
    ) -> Result<Arc<dyn Session>, ConnectionError> {
        let _guard = self.lifecycle.lock().await;
        if self.released.load(Ordering::SeqCst) {
            return Err(ConnectionError::Released);
        }
        if let Some(session) = self.session() {
            return Ok(session);
        }
        self.establish_with_retry(shutdown).await
    }

    /// Tear down the current session and establish a fresh one.
    pub async fn reconnect(
        &self,
        shutdown: &ShutdownCoordinator,
    ) -> Result<Arc<dyn Session>, ConnectionError> {
        let _guard = self.lifecycle.lock().await;
        if self.released.load(Ordering::SeqCst) {
            return Err(ConnectionError::Released);
        }

        info!(endpoint = %self.endpoint, "Reconnecting to endpoint");
        if let Some(stale) = self.take_active() {
            if let Err(e) = teardown(&stale, self.connect_timeout).await {
                warn!(error = %e, "Failed to tear down stale session; continuing with reconnect");
            }
        }
        self.establish_with_retry(shutdown).await
    }

    /// Close the session and disconnect. Only the first call does any work.
    pub async fn release(&self) -> Result<(), ShutdownError> {
        let _guard = self.lifecycle.lock().await;
        if self.released.swap(true, Ordering::SeqCst) {
            debug!("Connection manager already released");
            return Ok(());
        }

        match self.take_active() {
            Some(active) => {
                info!(endpoint = %self.endpoint, "Releasing session");
                teardown(&active, self.connect_timeout).await
            }
            None => Ok(()),
        }
    }

    /// Whether [`release`](Self::release) has run
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn take_active(&self) -> Option<ActiveSession> {
        self.active.write().unwrap_or_else(|e| e.into_inner()).take()
    }

    async fn establish_with_retry(
        &self,
        shutdown: &ShutdownCoordinator,
    ) -> Result<Arc<dyn Session>, ConnectionError> {
        let max_attempts = self.policy.max_retry.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.attempts.fetch_add(1, Ordering::SeqCst);
            debug!(attempt, max_attempts, endpoint = %self.endpoint, "Connecting");

            let err = match self.establish_once().await {
                Ok(active) => {
                    metrics::record_connection_attempt(true);
                    if attempt > 1 {
                        let ctx = RetryContext::succeeded(attempt, max_attempts, &self.endpoint);
                        info!("{}", ctx.format_success());
                    }
                    let session = active.session.clone();
                    *self.active.write().unwrap_or_else(|e| e.into_inner()) = Some(active);
                    info!(endpoint = %self.endpoint, attempt, "Session established");
                    return Ok(session);
                }
                Err(err) => err,
            };
            metrics::record_connection_attempt(false);

            if !self.policy.allows_another(attempt) {
                let ctx = RetryContext::new(attempt, max_attempts, &err, Duration::ZERO, &self.endpoint);
                error!("{}", ctx.format_failure());
                return Err(ConnectionError::Exhausted {
                    endpoint: self.endpoint.clone(),
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = self.policy.delay_after(attempt);
            let ctx = RetryContext::new(attempt, max_attempts, &err, delay, &self.endpoint);
            warn!(
                attempt,
                max_attempts,
                backoff_ms = delay.as_millis() as u64,
                error = %err,
                "{}",
                ctx.format_retry()
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {},
                _ = shutdown.wait_for_shutdown() => {
                    info!(attempts = attempt, "Shutdown requested while waiting to reconnect");
                    return Err(ConnectionError::Interrupted { attempts: attempt });
                }
            }
        }
    }

    async fn establish_once(&self) -> Result<ActiveSession, SessionError> {
        let connection = tokio::time::timeout(self.connect_timeout, self.connector.connect(&self.endpoint))
            .await
            .map_err(|_| SessionError::Timeout(self.connect_timeout))??;

        let created = tokio::time::timeout(self.connect_timeout, connection.create_session())
            .await
            .map_err(|_| SessionError::Timeout(self.connect_timeout))
            .and_then(|r| r);

        match created {
            Ok(session) => Ok(ActiveSession {
                connection,
                session,
            }),
            Err(err) => {
                // Do not leave a half-open connection behind.
                if let Err(e) = connection.disconnect().await {
                    debug!(error = %e, "Disconnect after failed session creation also failed");
                }
                Err(err)
            }
        }
    }
}

/// Close the session, then disconnect; both steps always run.
/// Close then disconnect, each step bounded by `limit`. A hung close still
/// lets the disconnect run.
async fn teardown(active: &ActiveSession, limit: Duration) -> Result<(), ShutdownError> {
    let closed = match tokio::time::timeout(limit, active.session.close()).await {
        Ok(result) => result.map_err(ShutdownError::CloseFailed),
        Err(_) => Err(ShutdownError::TimedOut {
            step: "session close",
            limit,
        }),
    };
    let disconnected = match tokio::time::timeout(limit, active.connection.disconnect()).await {
        Ok(result) => result.map_err(ShutdownError::DisconnectFailed),
        Err(_) => Err(ShutdownError::TimedOut {
            step: "disconnect",
            limit,
        }),
    };
    closed.and(disconnected)
}
