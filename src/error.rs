use thiserror::Error;

/// How a request against the admin API ended when it did not produce data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The caller's cancellation token fired; never shown to the user.
    #[error("request cancelled")]
    Cancelled,

    /// No usable response: connection failure, timeout, body read failure.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a failure, either non-2xx or an `{ "error": .. }` payload.
    #[error("server error {status}: {message}")]
    Application { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),

    /// An entity id that cannot be addressed as a single path segment.
    #[error("invalid identifier {0:?}")]
    InvalidId(String),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    /// Text for the notification channel. `None` for cancellations.
    pub fn user_message(&self) -> Option<String> {
        match self {
            FetchError::Cancelled => None,
            FetchError::Network(_) => {
                Some("Network error: could not reach the server. Please try again.".to_string())
            }
            FetchError::Application { message, .. } => Some(message.clone()),
            FetchError::Decode(_) => Some("Unexpected response from the server.".to_string()),
            FetchError::InvalidId(id) => Some(format!("Invalid identifier \"{}\".", id)),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Network("request timed out".to_string())
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}
