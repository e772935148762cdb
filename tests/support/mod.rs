//! Scriptable remote source shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use opc_data_logger::session::{Connection, Connector, Session, SessionError, SessionResult};
use opc_data_logger::ReadResult;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

type Hook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Inner {
    failing_connects: AtomicU32,
    values: Mutex<Option<Vec<ReadResult>>>,
    batch_error: Mutex<Option<SessionError>>,
    read_delay: Mutex<Duration>,
    close_delay: Mutex<Duration>,
    ping_failing: AtomicBool,
    on_batch_read: Mutex<Option<Hook>>,

    connect_times: Mutex<Vec<Instant>>,
    sessions_created: AtomicU32,
    closes: AtomicU32,
    disconnects: AtomicU32,
    batch_reads: AtomicU32,
    pings: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

/// A remote source whose behavior each test scripts.
///
/// By default every connect succeeds, a batch read of `n` points returns
/// `10.0, 20.0, ...` and pings return `1.0`.
#[derive(Clone, Default)]
pub struct MockSource {
    inner: Arc<Inner>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            inner: self.inner.clone(),
        })
    }

    /// Fail the next `n` connection attempts.
    pub fn fail_connects(&self, n: u32) {
        self.inner.failing_connects.store(n, Ordering::SeqCst);
    }

    pub fn set_values(&self, values: Vec<ReadResult>) {
        *self.inner.values.lock().unwrap() = Some(values);
    }

    pub fn set_batch_error(&self, error: Option<SessionError>) {
        *self.inner.batch_error.lock().unwrap() = error;
    }

    /// Delay every read (batch and ping) by `delay`.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.inner.read_delay.lock().unwrap() = delay;
    }

    /// Hold every session close for `delay`.
    pub fn set_close_delay(&self, delay: Duration) {
        *self.inner.close_delay.lock().unwrap() = delay;
    }

    pub fn set_ping_failing(&self, failing: bool) {
        self.inner.ping_failing.store(failing, Ordering::SeqCst);
    }

    /// Run `hook` while a batch read is in progress.
    pub fn on_batch_read(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.inner.on_batch_read.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn connect_attempts(&self) -> u32 {
        self.inner.connect_times.lock().unwrap().len() as u32
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.inner.connect_times.lock().unwrap().clone()
    }

    pub fn sessions_created(&self) -> u32 {
        self.inner.sessions_created.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> u32 {
        self.inner.disconnects.load(Ordering::SeqCst)
    }

    pub fn batch_reads(&self) -> u32 {
        self.inner.batch_reads.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> u32 {
        self.inner.pings.load(Ordering::SeqCst)
    }

    /// Highest number of reads that were ever running at the same time
    pub fn max_in_flight(&self) -> u32 {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

struct MockConnector {
    inner: Arc<Inner>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &str) -> SessionResult<Arc<dyn Connection>> {
        self.inner.connect_times.lock().unwrap().push(Instant::now());

        let remaining = self.inner.failing_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.inner
                .failing_connects
                .store(remaining - 1, Ordering::SeqCst);
            return Err(SessionError::ConnectFailed(format!(
                "{endpoint}: connection refused"
            )));
        }

        Ok(Arc::new(MockConnection {
            inner: self.inner.clone(),
        }))
    }
}

struct MockConnection {
    inner: Arc<Inner>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn create_session(&self) -> SessionResult<Arc<dyn Session>> {
        self.inner.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockSession {
            inner: self.inner.clone(),
        }))
    }

    async fn disconnect(&self) -> SessionResult<()> {
        self.inner.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockSession {
    inner: Arc<Inner>,
}

impl MockSession {
    async fn simulate_latency(&self) {
        let in_flight = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self.inner.read_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Session for MockSession {
    async fn read_batch(&self, point_ids: &[String]) -> SessionResult<Vec<ReadResult>> {
        self.inner.batch_reads.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.inner.on_batch_read.lock().unwrap().as_ref() {
            hook();
        }
        self.simulate_latency().await;

        if let Some(err) = self.inner.batch_error.lock().unwrap().clone() {
            return Err(err);
        }
        let scripted = self.inner.values.lock().unwrap().clone();
        Ok(scripted.unwrap_or_else(|| {
            (1..=point_ids.len())
                .map(|i| ReadResult::Value(i as f64 * 10.0))
                .collect()
        }))
    }

    async fn read_one(&self, point_id: &str) -> SessionResult<ReadResult> {
        self.inner.pings.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.inner.ping_failing.load(Ordering::SeqCst) {
            Ok(ReadResult::failed(format!("BadCommunicationError on {point_id}")))
        } else {
            Ok(ReadResult::Value(1.0))
        }
    }

    async fn close(&self) -> SessionResult<()> {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.inner.close_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

/// Poll `condition` every 10ms until it holds or `within` passes.
pub async fn eventually(within: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Read every `OPC_Log_*.csv` in `dir`, sorted by file name.
pub fn log_files(dir: &std::path::Path) -> Vec<(String, String)> {
    let mut files: Vec<(String, String)> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("OPC_Log_") && name.ends_with(".csv"))
        .map(|name| {
            let contents = std::fs::read_to_string(dir.join(&name)).unwrap();
            (name, contents)
        })
        .collect();
    files.sort();
    files
}
