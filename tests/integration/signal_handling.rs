use std::sync::Arc;
use std::time::Duration;

use opc_data_logger::connection::{ConnectionManager, RetryPolicy};
use opc_data_logger::scheduler::Scheduler;
use opc_data_logger::shutdown::ShutdownCoordinator;
use opc_data_logger::PointSet;
use tempfile::TempDir;

use crate::support::{eventually, MockSource};

#[tokio::test]
async fn shutdown_notifies_waiters() {
    let shutdown = ShutdownCoordinator::shared();
    let waiter = {
        let handle = shutdown.clone();
        tokio::spawn(async move {
            handle.wait_for_shutdown().await;
            true
        })
    };

    // Give the task time to start waiting
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.request_shutdown();

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
    assert!(result.is_ok());
}

/// Shutdown requested before anyone waits must not be missed.
#[tokio::test]
async fn shutdown_requested_before_wait_does_not_deadlock() {
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let handle = shutdown.clone();
    let waiter = tokio::spawn(async move {
        handle.wait_for_shutdown().await;
        true
    });

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
    assert!(result.is_ok(), "wait_for_shutdown() deadlocked despite shutdown already requested");
}

#[tokio::test]
async fn shutdown_concurrent_waiters_all_notified() {
    let shutdown = ShutdownCoordinator::shared();

    let mut waiters = Vec::new();
    for _ in 0..10 {
        let handle = shutdown.clone();
        waiters.push(tokio::spawn(async move {
            handle.wait_for_shutdown().await;
        }));
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    shutdown.request_shutdown();

    for waiter in waiters {
        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(result.is_ok(), "A waiter was not notified of shutdown");
    }
}

#[tokio::test]
async fn shutdown_wait_returns_immediately_when_already_set() {
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let start = tokio::time::Instant::now();
    shutdown.wait_for_shutdown().await;
    let elapsed = start.elapsed();

    assert!(elapsed < Duration::from_millis(10), "wait_for_shutdown took too long: {:?}", elapsed);
}

/// A stopped scheduler schedules nothing further, and releasing afterwards
/// closes the session and the connection once each.
#[tokio::test]
async fn stop_then_release_tears_down_in_order() {
    let source = MockSource::new();
    let manager = Arc::new(ConnectionManager::new(
        source.connector(),
        "mock://plant",
        RetryPolicy::default(),
    ));
    manager.acquire(&ShutdownCoordinator::new()).await.unwrap();
    let dir = TempDir::new().unwrap();

    let handle = Scheduler::new(manager.clone(), PointSet::from_ids(["ns=1;s=Tag1"]), dir.path())
        .unwrap()
        .with_log_interval(Duration::from_millis(50))
        .with_keep_alive_interval(Duration::from_millis(20))
        .with_read_timeout(Duration::from_millis(15))
        .start();

    assert!(eventually(Duration::from_secs(5), || source.pings() >= 2).await);
    assert!(handle.stop(Duration::from_secs(2)).await);
    manager.release().await.unwrap();

    let reads = source.batch_reads();
    let pings = source.pings();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(source.batch_reads(), reads);
    assert_eq!(source.pings(), pings);
    assert_eq!(source.closes(), 1);
    assert_eq!(source.disconnects(), 1);
}
