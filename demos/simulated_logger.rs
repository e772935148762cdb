//! Example running the logger against the in-process simulated source
//!
//! Run with:
//! ```bash
//! cargo run --example simulated_logger
//! ```
//!
//! Rows land in `./demo-logs/OPC_Log_YYYY-MM-DD_HH.csv`. One point is
//! scripted to fail so the `N/A` column is visible. Press Ctrl+C to stop.

use std::sync::Arc;
use std::time::Duration;

use opc_data_logger::connection::{ConnectionManager, RetryPolicy};
use opc_data_logger::scheduler::Scheduler;
use opc_data_logger::session::simulated::SimulatedConnector;
use opc_data_logger::shutdown::{self, ShutdownCoordinator};
use opc_data_logger::PointSet;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("opc_data_logger=debug")
        .init();

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown::termination_signal().await;
            shutdown.request_shutdown();
        }
    });

    let connector = Arc::new(SimulatedConnector::with_failing_points(["ns=1;s=Tag3"]));
    let manager = Arc::new(ConnectionManager::new(
        connector,
        "sim://demo",
        RetryPolicy::default(),
    ));
    manager.acquire(&shutdown).await?;

    let points = PointSet::from_ids((1..=5).map(|i| format!("ns=1;s=Tag{i}")));
    let handle = Scheduler::new(manager.clone(), points, "./demo-logs")?
        .with_log_interval(Duration::from_secs(2))
        .with_keep_alive_interval(Duration::from_secs(1))
        .with_read_timeout(Duration::from_millis(500))
        .start();

    println!("\n=== Simulated logger started ===");
    println!("Writing rows every 2s to ./demo-logs. Press Ctrl+C to exit.\n");

    shutdown.wait_for_shutdown().await;

    let status = handle.logging_status();
    let pings = handle.ping_count();
    handle.stop(Duration::from_secs(5)).await;
    manager.release().await?;

    println!("\n=== Demo complete ===");
    println!("  Ticks: {} ({} failed)", status.ticks, status.failures);
    println!("  Keep-alive pings: {}", pings);
    Ok(())
}
