//! Error types for text-generation backends.

use std::fmt;

/// Broad category of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Connection refused, DNS failure, timeout.
    Network,
    /// HTTP 429.
    RateLimited,
    /// HTTP 401/403 or a missing credential.
    Authentication,
    /// Any other 4xx.
    ClientError,
    /// HTTP 5xx.
    ServerError,
    /// The provider answered but the body could not be understood.
    Parse,
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network error"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::Authentication => write!(f, "authentication error"),
            Self::ClientError => write!(f, "client error"),
            Self::ServerError => write!(f, "server error"),
            Self::Parse => write!(f, "parse error"),
        }
    }
}

/// Error raised by a [`TextGenerator`](super::TextGenerator).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
}

impl LlmError {
    fn new(kind: LlmErrorKind, message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            kind,
            message: message.into(),
            status,
        }
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message, None)
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Parse, message, None)
    }

    pub fn missing_credential(provider: &str) -> Self {
        Self::new(
            LlmErrorKind::Authentication,
            format!("API key not configured for {}", provider),
            None,
        )
    }

    /// Build an error from a non-success HTTP response.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        Self::new(classify_http_status(status), body, Some(status))
    }

    /// Map a `reqwest` transport error.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network_error(format!("Request timeout: {}", err))
        } else if err.is_connect() {
            Self::network_error(format!("Connection failed: {}", err))
        } else {
            Self::network_error(format!("Request failed: {}", err))
        }
    }
}

/// Classify an HTTP status code into an error kind.
pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        401 | 403 => LlmErrorKind::Authentication,
        429 => LlmErrorKind::RateLimited,
        400..=499 => LlmErrorKind::ClientError,
        _ => LlmErrorKind::ServerError,
    }
}
