//! Remote source interface
//!
//! The remote endpoint is reached through three seams mirroring its lifecycle:
//! a [`Connector`] opens a [`Connection`], a connection creates a [`Session`],
//! and the session serves point reads until it is closed.
//!
//! Adapters are selected by endpoint scheme in [`create_connector`]:
//!
//! - `sim://...` - in-process simulated source ([`simulated`])
//! - `http://...` / `https://...` - JSON gateway ([`http_gateway`])

use crate::ReadResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub mod http_gateway;
pub mod simulated;

/// Remote source errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// Endpoint could not be reached
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Endpoint was reached but refused to open a session
    #[error("session rejected: {0}")]
    SessionRejected(String),

    /// Operation did not complete in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A read request failed as a whole
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// Response could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Session was already closed
    #[error("session closed")]
    Closed,

    /// Endpoint scheme has no adapter
    #[error("unsupported endpoint: {0}")]
    UnsupportedEndpoint(String),
}

/// Result type for remote source operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Opens transport-level connections to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `endpoint`.
    async fn connect(&self, endpoint: &str) -> SessionResult<Arc<dyn Connection>>;
}

/// A live transport connection that can host a session.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Create a session on this connection.
    async fn create_session(&self) -> SessionResult<Arc<dyn Session>>;

    /// Tear down the transport. Safe to call more than once.
    async fn disconnect(&self) -> SessionResult<()>;
}

/// A stateful session on the remote endpoint, subject to an idle timeout.
#[async_trait]
pub trait Session: Send + Sync {
    /// Read all `point_ids` in one request.
    ///
    /// On success the result has one entry per requested id, in request
    /// order; each entry succeeds or fails independently.
    async fn read_batch(&self, point_ids: &[String]) -> SessionResult<Vec<ReadResult>>;

    /// Read a single point. Used for keep-alive.
    async fn read_one(&self, point_id: &str) -> SessionResult<ReadResult>;

    /// Close the session. Idempotent.
    async fn close(&self) -> SessionResult<()>;
}

/// Create the connector for an endpoint address based on its scheme.
///
/// `request_timeout` bounds individual requests for adapters that talk to a
/// network peer.
pub fn create_connector(
    endpoint: &str,
    request_timeout: Duration,
) -> SessionResult<Arc<dyn Connector>> {
    let scheme = endpoint
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .ok_or_else(|| {
            SessionError::UnsupportedEndpoint(format!("{endpoint} (missing scheme)"))
        })?;

    match scheme.as_str() {
        "sim" => Ok(Arc::new(simulated::SimulatedConnector::default())),
        "http" | "https" => Ok(Arc::new(http_gateway::HttpGatewayConnector::new(
            request_timeout,
        )?)),
        "opc.tcp" => Err(SessionError::UnsupportedEndpoint(format!(
            "{endpoint} (binary OPC UA transport is not built in; point --endpoint at an HTTP gateway)"
        ))),
        other => Err(SessionError::UnsupportedEndpoint(format!(
            "{endpoint} (unknown scheme '{other}')"
        ))),
    }
}
