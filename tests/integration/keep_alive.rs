//! Keep-alive pings and the reconnection policy

use std::sync::Arc;
use std::time::Duration;

use opc_data_logger::config::ReconnectPolicy;
use opc_data_logger::connection::{ConnectionError, ConnectionManager, RetryPolicy};
use opc_data_logger::scheduler::{KeepAliveError, KeepAliveTask, PingCounter};
use opc_data_logger::shutdown::{SharedShutdown, ShutdownCoordinator};
use tokio::sync::mpsc;

use crate::support::MockSource;

struct Harness {
    source: MockSource,
    counter: PingCounter,
    shutdown: SharedShutdown,
    fatal: mpsc::Receiver<ConnectionError>,
    task: KeepAliveTask,
}

async fn harness(reconnect: ReconnectPolicy, retry: RetryPolicy) -> Harness {
    let source = MockSource::new();
    let manager = Arc::new(ConnectionManager::new(source.connector(), "mock://plant", retry));
    manager.acquire(&ShutdownCoordinator::new()).await.unwrap();

    let counter = PingCounter::new();
    let shutdown = ShutdownCoordinator::shared();
    let (fatal_tx, fatal) = mpsc::channel(1);
    let task = KeepAliveTask::new(
        manager,
        "ns=0;i=2258",
        Duration::from_secs(1),
        counter.clone(),
        reconnect,
        shutdown.clone(),
        fatal_tx,
    );

    Harness {
        source,
        counter,
        shutdown,
        fatal,
        task,
    }
}

#[tokio::test]
async fn successful_pings_increment_the_counter() {
    let mut h = harness(ReconnectPolicy::Never, RetryPolicy::default()).await;

    assert_eq!(h.task.run_tick().await.unwrap(), 1);
    assert_eq!(h.task.run_tick().await.unwrap(), 2);
    assert_eq!(h.counter.get(), 2);
    assert_eq!(h.source.pings(), 2);
}

#[tokio::test]
async fn failed_ping_is_reported_and_not_counted() {
    let mut h = harness(ReconnectPolicy::Never, RetryPolicy::default()).await;
    h.task.run_tick().await.unwrap();

    h.source.set_ping_failing(true);
    for _ in 0..5 {
        let err = h.task.run_tick().await.unwrap_err();
        assert!(matches!(err, KeepAliveError::BadStatus { .. }));
    }
    assert_eq!(h.counter.get(), 1);
    assert_eq!(h.task.consecutive_failures(), 5);

    // Never reconnects by default
    assert_eq!(h.source.sessions_created(), 1);

    h.source.set_ping_failing(false);
    assert_eq!(h.task.run_tick().await.unwrap(), 2);
    assert_eq!(h.task.consecutive_failures(), 0);
}

#[tokio::test]
async fn slow_ping_times_out() {
    let mut h = harness(ReconnectPolicy::Never, RetryPolicy::default()).await;
    h.source.set_read_delay(Duration::from_secs(3));

    let err = tokio::time::timeout(Duration::from_secs(2), h.task.run_tick())
        .await
        .expect("ping must be bounded by the read timeout")
        .unwrap_err();
    assert!(matches!(err, KeepAliveError::Timeout(_)));
    assert_eq!(h.counter.get(), 0);
}

#[tokio::test]
async fn threshold_of_failures_triggers_reconnection() {
    let mut h = harness(ReconnectPolicy::from_threshold(3), RetryPolicy::default()).await;
    h.source.set_ping_failing(true);

    h.task.run_tick().await.unwrap_err();
    h.task.run_tick().await.unwrap_err();
    assert_eq!(h.source.sessions_created(), 1);

    h.task.run_tick().await.unwrap_err();
    assert_eq!(h.source.sessions_created(), 2);
    assert_eq!(h.source.closes(), 1);
    assert_eq!(h.task.consecutive_failures(), 0);
    assert!(!h.shutdown.is_shutdown_requested());
}

#[tokio::test(start_paused = true)]
async fn exhausted_reconnection_is_fatal() {
    let mut h = harness(
        ReconnectPolicy::from_threshold(1),
        RetryPolicy::from_millis(2, 100, 100),
    )
    .await;
    h.source.set_ping_failing(true);
    h.source.fail_connects(u32::MAX);

    h.task.run_tick().await.unwrap_err();

    let fatal = h.fatal.try_recv().expect("fatal error should be reported");
    assert!(matches!(fatal, ConnectionError::Exhausted { attempts: 2, .. }));
    assert!(h.shutdown.is_shutdown_requested());

    // Later ticks find no session
    assert!(matches!(
        h.task.run_tick().await,
        Err(KeepAliveError::NoSession)
    ));
}
