use thiserror::Error;

/// Errors produced while talking to the remote model service
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("API key not found; set the {0} environment variable")]
    MissingApiKey(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Parse(String),
}

/// Errors returned by conversation session operations.
///
/// None of these are fatal: the session stays usable after any of them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Message is empty")]
    EmptyInput,

    #[error("Unknown model: {0}")]
    InvalidModel(String),

    #[error("A request is already in progress")]
    Busy,

    #[error("Remote service error: {0}")]
    RemoteService(#[from] ModelError),
}

impl SessionError {
    /// Whether the error was caused by the caller rather than the remote service
    pub fn is_client_error(&self) -> bool {
        !matches!(self, SessionError::RemoteService(_))
    }
}
