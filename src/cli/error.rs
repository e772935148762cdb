//! CLI error types and conversions

use crate::config::ConfigError;
use crate::connection::ConnectionError;
use crate::metrics::MetricsError;
use crate::output::OutputError;
use crate::session::SessionError;

/// Errors that end the process with a non-zero exit code
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Session could not be established or re-established
    #[error("connection error: {0}")]
    ConnectionError(#[from] ConnectionError),

    /// Endpoint could not be used at all
    #[error("session error: {0}")]
    SessionError(#[from] SessionError),

    /// Log directory could not be prepared
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Metrics exporter could not be installed
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}
