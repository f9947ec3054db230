//! Error model for the client core.
//!
//! # Design
//! Every failure surfaced by an engine is a single `ClientError` value. The
//! `kind` tells callers which failure path produced it, while `status` is
//! only ever present when an HTTP response was actually received: a
//! transport failure never carries one, and a decode failure keeps the
//! success status the server returned.
//!
//! Error bodies are validated into `ErrorBody` at the boundary instead of
//! being poked at as untyped JSON.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::http::canonical_reason;

/// Which failure path produced a `ClientError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The server answered with a non-2xx status.
    Http,
    /// No response was received (DNS, connect, reset, ...).
    Transport,
    /// A 2xx response whose body could not be parsed as expected.
    Decode,
    /// The request payload could not be serialized.
    Encode,
    /// The caller cancelled the call before it settled.
    Cancelled,
    /// A facade-level deadline elapsed.
    Timeout,
    /// The credential could not be written to durable storage.
    Storage,
}

/// The single failure currency of the client.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ClientError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    code: Option<String>,
    details: Option<Value>,
}

impl ClientError {
    /// Normalize a non-2xx response.
    ///
    /// The message is the first non-empty string among the body's `message`,
    /// `error` and `detail` fields, falling back to the status text. The code
    /// is the body's `code` when supplied, otherwise the stringified status.
    pub fn from_response(status: u16, status_text: &str, body: &[u8]) -> Self {
        let parsed = ErrorBody::parse(body).unwrap_or_default();
        let message = match parsed.message() {
            Some(message) => message.to_string(),
            None => fallback_message(status, status_text),
        };
        Self {
            kind: ErrorKind::Http,
            message,
            status: Some(status),
            code: Some(parsed.code().unwrap_or_else(|| status.to_string())),
            details: parsed.details,
        }
    }

    /// A failure where no response reached the client.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::statusless(ErrorKind::Transport, message.into())
    }

    /// A success-status body that failed to parse. Keeps the real status.
    pub fn decode(status: u16, reason: impl std::fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Decode,
            message: format!("Failed to parse response body: {reason}"),
            status: Some(status),
            code: Some(status.to_string()),
            details: None,
        }
    }

    pub fn encode(reason: impl std::fmt::Display) -> Self {
        Self::statusless(
            ErrorKind::Encode,
            format!("Failed to serialize request body: {reason}"),
        )
    }

    pub fn cancelled() -> Self {
        Self::statusless(ErrorKind::Cancelled, "Request was cancelled".to_string())
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::statusless(
            ErrorKind::Timeout,
            format!("Request timed out after {}s", after.as_secs_f64()),
        )
    }

    pub fn storage(reason: impl std::fmt::Display) -> Self {
        Self::statusless(ErrorKind::Storage, format!("Failed to persist session: {reason}"))
    }

    fn statusless(kind: ErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            status: None,
            code: None,
            details: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status of the response that produced this error, if one arrived.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    pub fn is_client_error(&self) -> bool {
        self.kind == ErrorKind::Http && matches!(self.status, Some(400..=499))
    }

    pub fn is_server_error(&self) -> bool {
        self.kind == ErrorKind::Http && matches!(self.status, Some(500..=599))
    }

    /// Transport failures and timeouts are retryable by convention. Nothing
    /// in the core retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Transport | ErrorKind::Timeout)
    }
}

fn fallback_message(status: u16, status_text: &str) -> String {
    if !status_text.is_empty() {
        return status_text.to_string();
    }
    match canonical_reason(status) {
        Some(reason) => reason.to_string(),
        None => format!("Request failed with status {status}"),
    }
}

/// The error shape the backend is expected to send:
/// `{ message | error | detail: string, code?, details?: object }`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    detail: Option<Value>,
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    details: Option<Value>,
}

impl ErrorBody {
    /// Only JSON objects are accepted; anything else degrades to the generic
    /// status-text message.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(body).ok()?;
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    pub fn message(&self) -> Option<&str> {
        [&self.message, &self.error, &self.detail]
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty())
    }

    pub fn code(&self) -> Option<String> {
        match self.code.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
