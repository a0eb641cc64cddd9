//! Client error types.

use thiserror::Error;

/// Errors from talking to the storefront API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A request URL could not be built.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// No credentials are stored.
    #[error("no active session")]
    NoActiveSession,

    /// Credentials were rejected even after a refresh. Stored tokens have
    /// been cleared.
    #[error("unauthorized")]
    Unauthorized,

    /// The API answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    /// Whether retrying later could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Url(_) | Self::NoActiveSession | Self::Unauthorized => false,
        }
    }
}

/// Errors from the delivery selection state machine.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The state or zone is not a valid choice right now.
    #[error("{0}")]
    InvalidSelection(String),

    /// Saving requires a session and there is none.
    #[error("no active session")]
    NoActiveSession,

    /// The zone catalog could not be reached; confirm stays disabled.
    #[error("delivery zones are temporarily unavailable: {0}")]
    TransientFetchFailure(String),

    /// Any other API failure.
    #[error(transparent)]
    Client(ClientError),
}

impl From<ClientError> for CoordinatorError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::NoActiveSession | ClientError::Unauthorized => Self::NoActiveSession,
            ClientError::Api {
                status: 400,
                message,
            } => Self::InvalidSelection(message),
            e if e.is_transient() => Self::TransientFetchFailure(e.to_string()),
            e => Self::Client(e),
        }
    }
}
