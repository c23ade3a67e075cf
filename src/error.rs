//! Centralized error types for mailcast.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailcast library.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The configuration file is missing a value or holds an invalid one.
    #[error("Invalid configuration in '{path}': {reason}")]
    Config { path: PathBuf, reason: String },

    /// An address could not be parsed as a mailbox.
    #[error("Invalid email address '{address}': {source}")]
    Address {
        address: String,
        source: lettre::address::AddressError,
    },

    /// A guessed MIME type was rejected by the message writer.
    #[error("Invalid content type '{content_type}': {reason}")]
    InvalidContentType {
        content_type: String,
        reason: String,
    },

    /// The message could not be assembled.
    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    /// Connection, TLS, authentication or submission failure on the relay.
    #[error("SMTP relay error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// Transport-level HTTP failure talking to the provider.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider API answered with a non-success status.
    #[error("Provider API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// An endpoint URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The authorization flow did not yield a usable token.
    #[error("Authorization failed: {0}")]
    Auth(String),

    /// The token cache could not be read or written.
    #[error("Token cache '{path}' is unusable: {reason}")]
    TokenCache { path: PathBuf, reason: String },
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an `Io` variant from a path and an `io::Error`.
    ///
    /// `NotFound` is mapped to [`Error::FileNotFound`] so callers get the
    /// short message for the common case.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::FileNotFound(path);
        }
        Self::Io { path, source }
    }

    /// Create a `Config` variant.
    pub fn config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
