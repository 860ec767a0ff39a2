//! Error types for the CodeFast client.
//!
//! Every failure surfaces as one [`CodeFastError`] variant. Network causes
//! are kept as `#[source]` so callers can walk the chain.

use std::path::PathBuf;
use thiserror::Error;

/// Maximum number of response-body characters embedded in error messages.
pub(crate) const BODY_EXCERPT_LEN: usize = 500;

/// Errors that can occur while authenticating or uploading.
#[derive(Error, Debug)]
pub enum CodeFastError {
    /// Caller input was missing or malformed. Raised before any network call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A token could not be obtained, or the server rejected it.
    #[error("authentication failed: {message}")]
    Authentication {
        /// What went wrong.
        message: String,
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Transport error, when no response was received.
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The upload path does not reference an existing regular file.
    #[error("file not found at path '{}'", path.display())]
    FileNotFound {
        /// The path as supplied by the caller.
        path: PathBuf,
    },

    /// The upload path exists but could not be opened for reading.
    #[error("failed to read file '{}': {source}", path.display())]
    FileRead {
        /// The path as supplied by the caller.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Any other upload failure.
    #[error("upload failed: {message}")]
    Upload {
        /// What went wrong.
        message: String,
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Raw response body, when one was received.
        body: Option<String>,
        /// Transport error, when no response was received.
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The HTTP transport could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// Failed to read a configuration file.
    #[error("failed to read config file '{}': {source}", path.display())]
    ConfigRead {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a configuration file.
    #[error("failed to parse config file '{}': {source}", path.display())]
    ConfigParse {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl CodeFastError {
    /// HTTP status code attached to this error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. } | Self::Upload { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether this error means the credentials or token were rejected.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    pub(crate) fn auth(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            status: None,
            source: None,
        }
    }
}

/// Shorten a response body for inclusion in a log line or error message.
pub(crate) fn excerpt(body: &str) -> String {
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Result type alias for CodeFast operations.
pub type Result<T> = std::result::Result<T, CodeFastError>;
