/// Errors surfaced by the chat client and session API.
///
/// Frame-level anomalies (malformed `data:` payloads, missing content fields)
/// never reach this type; they are absorbed by the event extractor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Invalid or missing client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input (blank submission, zero event buffer).
    #[error("validation error: {0}")]
    Validation(String),
    /// A turn is already sending or streaming for this session.
    #[error("a turn is already in flight for this session")]
    TurnInFlight,
    /// Completion endpoint answered with a non-success status.
    #[error("completion request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    /// Network failure or response body read failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The turn was aborted by the caller.
    #[error("turn cancelled")]
    Cancelled,
    /// Internal sequencing error (for example the turn task vanished).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ChatError {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns the HTTP status for `Status` errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "chat.config",
            Self::Validation(_) => "chat.validation",
            Self::TurnInFlight => "chat.turn_in_flight",
            Self::Status { status, .. } if *status == 401 => "http.auth.401",
            Self::Status { status, .. } if *status == 429 => "http.rate_limited.429",
            Self::Status { status, .. } if *status >= 500 => "http.server_error.5xx",
            Self::Status { .. } => "http.invalid_request",
            Self::Transport(_) => "http.transport",
            Self::Cancelled => "chat.cancelled",
            Self::Protocol(_) => "chat.protocol",
        }
    }
}
