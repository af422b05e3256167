//! Error types
//!
//! Transport failures are classified so the session can pick the reply the
//! patient sees. Session errors are contract violations by the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport error with classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status when the server answered at all
    pub status: Option<u16>,
}

impl TransportError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            422 => Self::validation(format!("Invalid payload: {body}")),
            _ => Self::server(format!("HTTP {status}: {body}")),
        }
        .with_status(status)
    }
}

/// Error classification surfaced by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Server rejected the payload shape (422)
    Validation,
    /// Any other non-2xx answer
    Server,
    /// No response reachable
    Network,
    /// Fallback
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Server => "server_error",
            ErrorKind::Network => "network_error",
            ErrorKind::Unknown => "unknown_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Misuse of the session by its caller
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Session runtime has stopped")]
    Closed,
}
