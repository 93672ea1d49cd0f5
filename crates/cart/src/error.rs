//! Errors raised by the cart gateway and surfaced by the store.
//!
//! Transport failures and server rejections are propagated unchanged to the
//! caller. Local precondition violations (no identity, unknown line) are not
//! errors at all: the store treats them as silent no-ops.

use thiserror::Error;

/// Maximum number of characters of a response body kept in logs.
const LOG_BODY_LIMIT: usize = 500;

/// Errors that can occur when talking to the cart backend.
#[derive(Debug, Error)]
pub enum CartError {
    /// Network unreachable, connection reset or deadline exceeded.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Backend answered with a non-2xx status.
    #[error("{method} {path} failed with HTTP {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// HTTP method of the request.
        method: String,
        /// Request path including the query string.
        path: String,
        /// `message` field of the error payload, if any.
        message: Option<String>,
        /// Parsed or raw response body.
        body: ResponseBody,
    },

    /// Response body could not be parsed.
    #[error("invalid response from {path}: {source}")]
    InvalidPayload {
        /// Request path including the query string.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Response parsed but a cart record violates the cart invariants.
    #[error("invalid cart record from {path}: {reason}")]
    InvalidRecord {
        /// Request path including the query string.
        path: String,
        /// What was wrong with the record.
        reason: String,
    },

    /// Gateway URL could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Backend unavailable (in-process gateway).
    #[error("cart backend unavailable: {0}")]
    Unavailable(String),
}

impl CartError {
    /// Returns true if the request hit the client deadline.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// HTTP status of a server rejection.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message suitable for a non-blocking failure notice.
    ///
    /// Prefers the server-provided `message`, then a non-JSON response body
    /// (truncated), then the HTTP status.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            Self::Rejected {
                body: ResponseBody::Raw(text),
                ..
            } if !text.trim().is_empty() => truncate_for_log(text.trim()),
            Self::Rejected { status, .. } => format!("HTTP {status}"),
            Self::Transport(e) if e.is_timeout() => "The request timed out".to_string(),
            Self::Transport(_) | Self::Unavailable(_) => {
                "Could not reach the cart service".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Body of a response, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// No body.
    Empty,
    /// Body was valid JSON.
    Json(serde_json::Value),
    /// Body was not JSON.
    Raw(String),
}

impl ResponseBody {
    /// Classify a response body.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        if text.trim().is_empty() {
            return Self::Empty;
        }
        serde_json::from_str(text).map_or_else(|_| Self::Raw(text.to_string()), Self::Json)
    }

    /// The `message` field of a JSON error payload.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Json(value) => value.get("message").and_then(serde_json::Value::as_str),
            Self::Empty | Self::Raw(_) => None,
        }
    }
}

/// Truncate a response body for logging.
pub(crate) fn truncate_for_log(text: &str) -> String {
    text.chars().take(LOG_BODY_LIMIT).collect()
}
