//! Retry message formatting for session acquisition.
//!
//! Keeps connection retry logs consistent: one line per failed attempt with
//! counters and the upcoming wait, and a multi-line summary once attempts are
//! exhausted.

use crate::session::SessionError;
use std::time::Duration;

/// Classification of connection failures for operator messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Connect or session creation did not finish in time
    Timeout,
    /// Endpoint unreachable (refused, DNS failure, ...)
    Unreachable,
    /// Endpoint reachable but the session was refused
    SessionRejected,
    /// Endpoint answered with something unexpected
    Protocol,
    /// Endpoint address cannot be served by any adapter
    Unsupported,
    /// Fallback when no better classification fits
    Generic,
}

impl RetryErrorType {
    /// Classify a session error.
    pub fn from_error(err: &SessionError) -> Self {
        match err {
            SessionError::Timeout(_) => Self::Timeout,
            SessionError::ConnectFailed(_) => Self::Unreachable,
            SessionError::SessionRejected(_) => Self::SessionRejected,
            SessionError::InvalidResponse(_) => Self::Protocol,
            SessionError::UnsupportedEndpoint(_) => Self::Unsupported,
            SessionError::ReadFailed(_) | SessionError::Closed => Self::Generic,
        }
    }

    /// User-friendly description used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Timeout => "connection timeout",
            Self::Unreachable => "endpoint unreachable",
            Self::SessionRejected => "session rejected",
            Self::Protocol => "unexpected response",
            Self::Unsupported => "unsupported endpoint",
            Self::Generic => "connection error",
        }
    }

    /// Suggested remediation shown after the final failure.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Timeout => "Check that the endpoint host is up and not overloaded",
            Self::Unreachable => "Verify the endpoint address, port and firewall rules",
            Self::SessionRejected => "Check the server's session limits and security settings",
            Self::Protocol => "Confirm the endpoint speaks the expected protocol",
            Self::Unsupported => "Use a sim:// or http(s):// endpoint address",
            Self::Generic => "Check network connectivity and try again",
        }
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Type of error that triggered the retry
    pub error_type: RetryErrorType,
    /// Wait until the next attempt
    pub backoff_duration: Duration,
    /// Endpoint being connected to
    pub endpoint: String,
    /// Original error message
    pub error_message: String,
}

impl RetryContext {
    /// Build a context for a failed attempt.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        error: &SessionError,
        backoff_duration: Duration,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type: RetryErrorType::from_error(error),
            backoff_duration,
            endpoint: endpoint.into(),
            error_message: error.to_string(),
        }
    }

    /// Build a context for an attempt that succeeded after earlier failures.
    pub fn succeeded(attempt: u32, max_attempts: u32, endpoint: impl Into<String>) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type: RetryErrorType::Generic,
            backoff_duration: Duration::ZERO,
            endpoint: endpoint.into(),
            error_message: String::new(),
        }
    }

    /// Format standardized retry message with attempt counters and wait.
    pub fn format_retry(&self) -> String {
        format!(
            "Connection attempt {}/{} to {} failed ({}) - retrying in {:.1} seconds...",
            self.attempt,
            self.max_attempts,
            self.endpoint,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64()
        )
    }

    /// Format the message logged when a retried attempt finally works.
    pub fn format_success(&self) -> String {
        format!(
            "Connection attempt {}/{} to {} succeeded",
            self.attempt, self.max_attempts, self.endpoint
        )
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let mut lines = vec![
            format!(
                "[FAILED] Could not establish a session after {} attempts",
                self.max_attempts
            ),
            format!("  Last error: {}", self.error_message),
            format!("  Endpoint: {}", self.endpoint),
            "  Suggestions:".to_string(),
        ];
        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }
        lines.join("\n")
    }

    /// Suggestions tailored to the failure.
    pub fn format_suggestions(&self) -> Vec<String> {
        vec![
            self.error_type.suggestion().to_string(),
            format!(
                "Try increasing --max-retry (current: {}) or --max-delay",
                self.max_attempts
            ),
        ]
    }
}
