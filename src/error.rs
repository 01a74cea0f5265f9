use reqwest::StatusCode;
use thiserror::Error;

/// Errors crossing the boundary to the upstream schedule service.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("websocket failed: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("payload did not match schema: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("unexpected status code {0}")]
    InvalidStatusCode(StatusCode),
    #[error("malformed endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Invariant violations of the per-conversation Zoom catalog.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ZoomError {
    #[error("an entry with this name is already in the database")]
    NameInDatabase,
    #[error("no entry with this name is in the database")]
    NameNotInDatabase,
}

/// Errors raised while servicing one incoming event. Fatal for the event,
/// never for the process.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no context attached to the event")]
    NoContext,
    #[error("{0}")]
    Frontend(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Zoom(#[from] ZoomError),
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("storage failed: {0}")]
    Storage(#[from] std::io::Error),
}

impl DispatchError {
    /// Text shown to the user verbatim, if this error has a user-facing form.
    pub fn frontend_text(&self) -> Option<&str> {
        match self {
            DispatchError::Frontend(text) => Some(text),
            _ => None,
        }
    }
}
