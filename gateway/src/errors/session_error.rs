//! Session error taxonomy.
//!
//! Protocol and input errors (`MalformedFrame`, `UnknownEventKind`,
//! `InvalidTransition`, `InvalidToolInput`) are reported to the session's error
//! subscribers and leave the session usable. `AdmissionRejected` rejects session
//! creation. `UpstreamChannelFailure` and `GracefulCloseTimeout` end in a forced
//! close.

use std::time::Duration;

use thiserror::Error;

use crate::core::codec::CodecError;
use crate::core::session::Phase;

/// Errors produced by [`DuplexSession`](crate::core::session::DuplexSession)
/// and [`SessionRegistry`](crate::core::registry::SessionRegistry).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    /// Audio payload is not valid base64 or not a whole number of samples
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Event kind outside the known taxonomy
    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    /// Operation not permitted in the current phase
    #[error("Invalid transition: cannot {operation} while session is {phase}")]
    InvalidTransition {
        operation: &'static str,
        phase: Phase,
    },

    /// Concurrent stream budget exhausted
    #[error("Admission rejected: all {limit} concurrent streams are in use")]
    AdmissionRejected { limit: usize },

    /// Tool input is missing a required field or has the wrong shape
    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    /// The upstream duplex channel could not be opened or was lost
    #[error("Upstream channel failure: {0}")]
    UpstreamChannelFailure(String),

    /// Operation attempted on a closed session
    #[error("Session {0} is closed")]
    SessionClosed(String),

    /// Graceful close did not reach `Closed` in time
    #[error("Graceful close did not complete within {0:?}")]
    GracefulCloseTimeout(Duration),

    /// A session with the same id is already registered
    #[error("Session {0} is already registered")]
    DuplicateSession(String),
}

impl SessionError {
    /// Stable machine-readable code sent to clients in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::MalformedFrame(_) => "malformed_frame",
            SessionError::UnknownEventKind(_) => "unknown_event_kind",
            SessionError::InvalidTransition { .. } => "invalid_transition",
            SessionError::AdmissionRejected { .. } => "admission_rejected",
            SessionError::InvalidToolInput(_) => "invalid_tool_input",
            SessionError::UpstreamChannelFailure(_) => "upstream_channel_failure",
            SessionError::SessionClosed(_) => "session_closed",
            SessionError::GracefulCloseTimeout(_) => "graceful_close_timeout",
            SessionError::DuplicateSession(_) => "duplicate_session",
        }
    }

    /// Whether the error ends the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::UpstreamChannelFailure(_) | SessionError::GracefulCloseTimeout(_)
        )
    }
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::MalformedFrame(msg) => SessionError::MalformedFrame(msg),
            CodecError::UnknownEventKind(kind) => SessionError::UnknownEventKind(kind),
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
