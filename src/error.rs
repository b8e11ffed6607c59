//! Error types for the upload session

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for session and API operations
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure is terminal for the run; nothing here is retried.
#[derive(Debug, Error)]
pub enum Error {
    /// The provider rejected the credential
    #[error("authentication failed (status {status}): {message}")]
    AuthenticationFailure { status: u16, message: String },

    /// Listing the identity's repositories was rejected
    #[error("could not list repositories (status {status}): {message}")]
    ListFailure { status: u16, message: String },

    /// Repository creation was rejected (name collision, invalid name, ...)
    #[error("could not create repository '{name}' (status {status}): {message}")]
    CreateFailure {
        name: String,
        status: u16,
        message: String,
    },

    /// The contents write was rejected
    #[error("could not upload '{path}' (status {status}): {message}")]
    UploadFailure {
        path: String,
        status: u16,
        message: String,
    },

    /// Out-of-range list index or an unknown menu option
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// The token cannot be sent in an `Authorization` header
    #[error("credential contains characters that cannot be sent in a header")]
    MalformedCredential,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Destination names must be a single path component
    #[error("'{0}' is not a usable file name")]
    InvalidFileName(String),

    /// A required input was blank
    #[error("{0} must not be empty")]
    EmptyInput(&'static str),

    #[error("terminal prompt failed: {0}")]
    Prompt(#[source] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to parse response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
