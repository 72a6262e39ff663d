// ABOUTME: Error taxonomy for the relay: transport failures, protocol violations, approvals, config.
// ABOUTME: Access-type transport failures are distinguishable so callers can explain instead of retry.

use crate::stream::StreamState;
use thiserror::Error;

/// Slack error codes that mean "the bot cannot see or act on this resource".
const ACCESS_ERROR_CODES: &[&str] = &[
    "channel_not_found",
    "is_private",
    "not_in_channel",
    "missing_scope",
    "access_denied",
    "method_not_supported_for_channel_type",
    "restricted_action",
];

/// Any failed call to the chat API. Never retried by the relay.
#[derive(Debug, Clone, Error)]
#[error("{method} failed: {message}")]
pub struct TransportError {
    /// Web API method, e.g. "chat.appendStream"
    pub method: String,
    /// Slack's error code when the API answered `ok: false`
    pub code: Option<String>,
    /// Human-readable description
    pub message: String,
}

impl TransportError {
    /// The API answered but reported `ok: false`
    pub fn api(method: impl Into<String>, code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            method: method.into(),
            message: code.clone(),
            code: Some(code),
        }
    }

    /// The request never produced a usable response
    pub fn network(method: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            method: method.into(),
            code: None,
            message: message.to_string(),
        }
    }

    /// Whether the target resource is unreachable for the bot (private/unknown channel etc.)
    pub fn is_access_error(&self) -> bool {
        self.code
            .as_deref()
            .map(|c| ACCESS_ERROR_CODES.contains(&c))
            .unwrap_or(false)
    }
}

/// Errors raised by the stream controller.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A stream operation was used against a handle that is not open.
    /// Indicates a bug in the event producer.
    #[error("protocol violation: {operation} on a {state} stream")]
    ProtocolViolation {
        operation: &'static str,
        state: StreamState,
    },
}

impl RelayError {
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation { .. })
    }
}

/// Errors raised by the approval registry.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("approval token already registered: {0}")]
    DuplicateToken(String),

    /// Resume for a token that was never created (lost click or tampering)
    #[error("unknown approval token: {0}")]
    UnknownToken(String),

    /// Second resume for the same token (duplicated click)
    #[error("approval already resolved: {0}")]
    AlreadyResolved(String),

    #[error("approval {token} is for channel {expected}, decision names {actual}")]
    ChannelMismatch {
        token: String,
        expected: String,
        actual: String,
    },

    /// The registry went away, or the request was discarded, while a tool call was waiting
    #[error("approval wait abandoned: {0}")]
    Abandoned(String),

    #[error("approval storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("approval storage lock poisoned")]
    Poisoned,
}

/// Errors raised by the assistant thread context store.
#[derive(Debug, Error)]
pub enum ThreadContextError {
    #[error("thread context storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("thread context storage lock poisoned")]
    Poisoned,
}

/// Invalid configuration detected at construction time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("status for terminal event kind '{0}' must be empty")]
    TerminalStatusNotEmpty(String),

    #[error("status tool name must not be empty")]
    EmptyToolName,

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
