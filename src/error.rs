//! Error types for release-verify.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while planning or executing a verification run.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is malformed or incomplete. Raised before any network I/O.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backend definitively reported that the artifact does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network-level failure (connection refused, DNS, reset).
    #[error("Network error: {0}")]
    Network(String),

    /// The backend refused access, including a failed anonymous token bootstrap.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The backend answered with a status that is neither success nor a definitive miss.
    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// A network call did not complete in time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A failure computed once and handed to every caller that waited on it.
    #[error("{0}")]
    Shared(Arc<Error>),
}

impl Error {
    /// Returns true if the error means "could not determine" rather than "missing".
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Shared(inner) => inner.is_transient(),
            _ => !matches!(self, Self::NotFound(_) | Self::Config(_)),
        }
    }
}
