//! Error types for the certificate authentication proxy

use std::io;

use thiserror::Error;

/// Result type alias for the certificate authentication proxy
pub type Result<T> = std::result::Result<T, Error>;

/// Certificate authentication proxy errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No signing key file exists at the configured path
    #[error("Signing key not found")]
    KeyNotFound,

    /// The signing key file exists but cannot be parsed
    #[error("Signing key parse error: {0}")]
    KeyParse(String),

    /// All CA trust sources failed to establish a trusted channel to the
    /// proxy's public key
    #[error("No trusted source for the proxy signing key")]
    NoTrustedKey,

    /// An assertion failed verification.
    ///
    /// Deliberately carries no detail: remote callers only learn *that*
    /// verification failed, never which policy check tripped.
    #[error("Assertion rejected")]
    Rejected,

    /// Key generation or signature encoding failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// URL error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
