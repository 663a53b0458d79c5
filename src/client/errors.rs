use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("endpoint is required")]
    EndpointRequired,

    #[error("missing ID in request")]
    IdRequired,

    #[error("number of retries must be zero or more")]
    InvalidRetries,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error(transparent)]
    MultiStatus(#[from] MultiStatusError),

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected content type: {0:?}")]
    UnexpectedContentType(String),

    #[error("could not deserialize response data: {0}")]
    Decode(String),

    #[error("could not serialize request data: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("request cancelled")]
    Cancelled,
}

impl ClientError {
    /// The HTTP status code, if this is a single status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Status(e) => Some(e.code),
            _ => None,
        }
    }
}

/// An HTTP error status returned by the courier API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}]: {message}")]
pub struct StatusError {
    pub code: u16,
    pub message: String,
}

impl StatusError {
    /// An empty message falls back to the canonical reason phrase of the code.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message = StatusCode::from_u16(code)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown Status")
                .to_string();
        }
        Self { code, message }
    }
}

/// The distinct errors collected over several attempts of one request.
#[derive(Debug)]
pub struct MultiStatusError {
    errors: Vec<ClientError>,
    pub attempts: usize,
    pub delay: Duration,
}

impl MultiStatusError {
    pub fn errors(&self) -> &[ClientError] {
        &self.errors
    }

    pub fn last(&self) -> Option<&ClientError> {
        self.errors.last()
    }
}

impl fmt::Display for MultiStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last() {
            Some(last) => write!(f, "after {} attempts: {}", self.attempts, last),
            None => write!(f, "after {} attempts", self.attempts),
        }
    }
}

impl std::error::Error for MultiStatusError {}

/// Deduplicate errors by their rendered message, keeping first-seen order.
///
/// Returns `None` without errors and the error itself when only one distinct error
/// remains (e.g. every attempt got the same status), otherwise a
/// [`MultiStatusError`].
pub fn join_status_errors(
    attempts: usize,
    delay: Duration,
    errs: impl IntoIterator<Item = ClientError>,
) -> Option<ClientError> {
    let mut seen = std::collections::HashSet::new();
    let mut errors: Vec<ClientError> = errs
        .into_iter()
        .filter(|e| seen.insert(e.to_string()))
        .collect();

    match errors.len() {
        0 => None,
        1 => errors.pop(),
        _ => Some(ClientError::MultiStatus(MultiStatusError {
            errors,
            attempts,
            delay,
        })),
    }
}
