//! JSON gateway adapter
//!
//! Talks to an HTTP gateway that fronts the industrial endpoint:
//!
//! | operation | request | response |
//! |---|---|---|
//! | connect | `GET {base}/status` | any 2xx |
//! | create session | `POST {base}/sessions` | `{"session_id": "..."}` |
//! | read | `POST {base}/sessions/{id}/read` `{"nodes": [...]}` | `{"results": [{"value": 1.0} \| {"status": "Bad..."}]}` |
//! | close | `DELETE {base}/sessions/{id}` | 2xx, or 404 if already gone |

use super::{Connection, Connector, Session, SessionError, SessionResult};
use crate::ReadResult;
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Status string the gateway uses for good reads
const GOOD_STATUS: &str = "Good";

/// Connector for `http://` and `https://` gateway endpoints
pub struct HttpGatewayConnector {
    client: Client,
    timeout: Duration,
}

impl HttpGatewayConnector {
    /// Build a connector whose requests are bounded by `timeout`.
    pub fn new(timeout: Duration) -> SessionResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::ConnectFailed(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Connector for HttpGatewayConnector {
    async fn connect(&self, endpoint: &str) -> SessionResult<Arc<dyn Connection>> {
        let base_url = endpoint.trim_end_matches('/').to_string();
        let url = format!("{base_url}/status");
        debug!(url = %url, "Probing gateway");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify(&e, self.timeout, SessionError::ConnectFailed))?;

        if !response.status().is_success() {
            return Err(SessionError::ConnectFailed(format!(
                "gateway status check returned {}",
                response.status()
            )));
        }

        Ok(Arc::new(HttpGatewayConnection {
            client: self.client.clone(),
            base_url,
            timeout: self.timeout,
        }))
    }
}

struct HttpGatewayConnection {
    client: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SessionCreated {
    session_id: String,
}

#[async_trait]
impl Connection for HttpGatewayConnection {
    async fn create_session(&self) -> SessionResult<Arc<dyn Session>> {
        let url = format!("{}/sessions", self.base_url);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| classify(&e, self.timeout, SessionError::SessionRejected))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::SessionRejected(format!("{status}: {body}")));
        }

        let created: SessionCreated = response
            .json()
            .await
            .map_err(|e| SessionError::InvalidResponse(format!("session creation: {e}")))?;
        debug!(session_id = %created.session_id, "Gateway session created");

        Ok(Arc::new(HttpGatewaySession {
            client: self.client.clone(),
            session_url: format!("{}/sessions/{}", self.base_url, created.session_id),
            timeout: self.timeout,
            closed: AtomicBool::new(false),
        }))
    }

    /// HTTP connections are pooled by the client; there is nothing to tear down.
    async fn disconnect(&self) -> SessionResult<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ReadRequest<'a> {
    nodes: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    results: Vec<NodeResult>,
}

#[derive(Debug, Default, Deserialize)]
struct NodeResult {
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    status: Option<String>,
}

impl From<NodeResult> for ReadResult {
    fn from(node: NodeResult) -> Self {
        if let Some(status) = node.status.filter(|s| s != GOOD_STATUS) {
            return ReadResult::failed(status);
        }

        match node.value {
            Some(serde_json::Value::Number(n)) => match n.as_f64() {
                Some(v) => ReadResult::from(v),
                None => ReadResult::failed(format!("unrepresentable number {n}")),
            },
            Some(serde_json::Value::Bool(b)) => ReadResult::Value(if b { 1.0 } else { 0.0 }),
            Some(serde_json::Value::String(s)) => parse_text_value(&s),
            Some(other) => ReadResult::failed(format!("non-numeric value {other}")),
            None => ReadResult::failed("missing value"),
        }
    }
}

/// Numeric strings read as numbers, RFC 3339 timestamps as epoch seconds.
fn parse_text_value(text: &str) -> ReadResult {
    if let Ok(v) = text.trim().parse::<f64>() {
        return ReadResult::from(v);
    }
    match DateTime::parse_from_rfc3339(text.trim()) {
        Ok(ts) => ReadResult::Value(ts.timestamp() as f64),
        Err(_) => ReadResult::failed(format!("non-numeric value \"{text}\"")),
    }
}

/// A session held open on the gateway
pub struct HttpGatewaySession {
    client: Client,
    session_url: String,
    timeout: Duration,
    closed: AtomicBool,
}

impl HttpGatewaySession {
    async fn read(&self, nodes: &[String]) -> SessionResult<Vec<ReadResult>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }

        let response = self
            .client
            .post(format!("{}/read", self.session_url))
            .json(&ReadRequest { nodes })
            .send()
            .await
            .map_err(|e| classify(&e, self.timeout, SessionError::ReadFailed))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SessionError::Closed);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::ReadFailed(format!("{status}: {body}")));
        }

        let parsed: ReadResponse = response
            .json()
            .await
            .map_err(|e| SessionError::InvalidResponse(format!("read response: {e}")))?;

        if parsed.results.len() != nodes.len() {
            warn!(
                requested = nodes.len(),
                returned = parsed.results.len(),
                "Gateway returned a different number of results than requested"
            );
        }

        Ok(parsed.results.into_iter().map(ReadResult::from).collect())
    }
}

#[async_trait]
impl Session for HttpGatewaySession {
    async fn read_batch(&self, point_ids: &[String]) -> SessionResult<Vec<ReadResult>> {
        self.read(point_ids).await
    }

    async fn read_one(&self, point_id: &str) -> SessionResult<ReadResult> {
        let nodes = [point_id.to_string()];
        self.read(&nodes)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SessionError::InvalidResponse("empty read response".to_string()))
    }

    async fn close(&self) -> SessionResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let response = self
            .client
            .delete(&self.session_url)
            .send()
            .await
            .map_err(|e| classify(&e, self.timeout, SessionError::ReadFailed))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!(session_url = %self.session_url, "Gateway session closed");
            Ok(())
        } else {
            Err(SessionError::ReadFailed(format!("session close returned {status}")))
        }
    }
}

/// Map a transport error onto the session taxonomy.
fn classify(
    err: &reqwest::Error,
    timeout: Duration,
    otherwise: fn(String) -> SessionError,
) -> SessionError {
    if err.is_timeout() {
        SessionError::Timeout(timeout)
    } else if err.is_connect() {
        SessionError::ConnectFailed(err.to_string())
    } else {
        otherwise(err.to_string())
    }
}
