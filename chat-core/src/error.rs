//! Domain-specific error types for the chat client core.
//!
//! All fallible operations return `Result<T, ChatError>`.
//! No panics on invalid input: every error is typed.

use std::time::Duration;
use thiserror::Error;

use crate::message::Response;

/// The canonical error type for the chat client core.
#[derive(Debug, Error)]
pub enum ChatError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// The peer sent bytes that cannot be resolved into a frame.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// A state machine transition was requested from the wrong phase.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// `send` was called while the connection is not established.
    #[error("socket is not connected")]
    NotConnected,

    /// `close` was called on a connection that owns no transport.
    #[error("socket is not initiated")]
    NotInitialized,

    /// `connect` was called outside of a Tokio runtime.
    #[error("no tokio runtime available to drive the connection")]
    NoRuntime,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The server could not be reached at all.
    #[error("service unavailable")]
    Unavailable,

    // ── Exchange Errors ──────────────────────────────────────────
    /// The server answered with a non-success status.
    #[error("request rejected: {} {}", .0.status_code, .0.status)]
    Rejected(Box<Response>),

    /// A payload could not be (de)serialized as JSON.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for ChatError {
    fn from(s: String) -> Self {
        ChatError::Other(s)
    }
}

impl From<&str> for ChatError {
    fn from(s: &str) -> Self {
        ChatError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::StatusCode;

    #[test]
    fn error_display_messages() {
        let e = ChatError::Protocol("preamble mismatch");
        assert!(e.to_string().contains("preamble"));

        let e = ChatError::Rejected(Box::new(Response::with_status(StatusCode::UNAUTHORIZED)));
        assert!(e.to_string().contains("401"));
        assert!(e.to_string().contains("Unauthorized"));
    }

    #[test]
    fn from_string() {
        let e: ChatError = "something broke".into();
        assert!(matches!(e, ChatError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let e: ChatError = io_err.into();
        assert!(matches!(e, ChatError::Connection(_)));
    }

    #[test]
    fn from_json() {
        let json_err = serde_json::from_str::<Response>("{not json").unwrap_err();
        let e: ChatError = json_err.into();
        assert!(matches!(e, ChatError::Parse(_)));
    }
}
