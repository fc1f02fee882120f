//! Crate-wide error type.
//!
//! Every fallible operation in the client returns [`ClientError`]. Each
//! variant carries enough context to explain the failure to a user without
//! inspecting the originating error.

use thiserror::Error;

/// Errors produced by the chat client and its widgets.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend replied with a non-2xx HTTP status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The request never produced a response (DNS, refused, timeout, reset).
    #[error("connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },

    /// A response body could not be decoded into the expected shape.
    #[error("could not decode {what}: {detail}")]
    Decode { what: String, detail: String },

    /// User input rejected before any request was sent.
    #[error("{0}")]
    Validation(String),

    /// Configuration file or override could not be applied.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The user declined a confirmation prompt.
    #[error("cancelled")]
    Cancelled,
}

impl ClientError {
    /// Shorthand for [`ClientError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        ClientError::Validation(msg.into())
    }

    pub(crate) fn connect(url: &str, err: impl std::fmt::Display) -> Self {
        ClientError::Connect {
            url: url.to_string(),
            detail: err.to_string(),
        }
    }

    pub(crate) fn decode(what: &str, err: impl std::fmt::Display) -> Self {
        ClientError::Decode {
            what: what.to_string(),
            detail: err.to_string(),
        }
    }

    /// True when the failure was caught client-side and no request went out.
    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
