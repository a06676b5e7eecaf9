/// Client-specific result type
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors from the gateway and control-plane clients
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Gateway {
        /// HTTP status code
        status: u16,
        /// `detail`/`error` from the body, or the raw body text
        message: String,
    },

    /// The gateway reported an error inside an open stream
    #[error("stream error: {0}")]
    Stream(String),

    /// Failed to parse a response body
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Invalid client configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// HTTP status of a gateway error
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Gateway { status, .. } => Some(*status),
            _ => None,
        }
    }
}
