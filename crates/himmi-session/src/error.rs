use himmi_client::ClientError;

/// Errors returned by [`crate::CompletionSession::submit_turn`]
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// Input rejected before anything was sent or recorded
    #[error("{0}")]
    Validation(String),

    /// Another turn is still in flight for this session
    #[error("a turn is already in progress")]
    SessionBusy,

    /// The gateway answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Gateway { status: u16, message: String },

    /// Network failure, timeout, malformed body or an error frame mid-stream
    #[error("{0}")]
    Transport(String),

    /// The turn was cancelled or the conversation was cleared
    #[error("request cancelled")]
    Cancelled,
}

impl TurnError {
    /// Text written into the failed assistant message
    pub fn marker(&self) -> String {
        match self {
            Self::Gateway { status: 401, .. } => format!("Error: {self} (check your API key)"),
            _ => format!("Error: {self}"),
        }
    }

    /// Metric label for the turn outcome
    pub(crate) const fn outcome(&self) -> &'static str {
        match self {
            Self::Validation(_) => "rejected",
            Self::SessionBusy => "busy",
            Self::Gateway { .. } => "gateway_error",
            Self::Transport(_) => "transport_error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<ClientError> for TurnError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Gateway { status, message } => Self::Gateway { status, message },
            ClientError::Http(e) if e.is_timeout() => Self::Transport("request timed out".to_owned()),
            ClientError::Http(e) => Self::Transport(e.to_string()),
            ClientError::Stream(message) => Self::Transport(format!("gateway stream error: {message}")),
            ClientError::Parse(message) => Self::Transport(format!("invalid response: {message}")),
            ClientError::Config(message) => Self::Transport(message),
        }
    }
}

/// Errors from the shadow comparison state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ShadowError {
    #[error("no shadow comparison is awaiting a vote")]
    NotComparing,

    #[error("no shadow request is in flight")]
    NotAwaiting,
}
