//! Main entry point for the opc-data-logger binary

use clap::Parser;
use opc_data_logger::cli::{Cli, CliError};
use opc_data_logger::shutdown::{self, ShutdownCoordinator};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("opc_data_logger=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown::termination_signal().await;
            tracing::warn!("Termination signal received - stopping after in-flight ticks");
            shutdown.request_shutdown();
        }
    });

    let result = cli.execute(shutdown).await.map_err(anyhow::Error::from);

    if let Err(e) = result {
        error!("Data logger failed: {:#}", e);
        let code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
        std::process::exit(code);
    }
}
