//! Error types for obs-core
//!
//! None of these ever reach a capture caller: the capture and flush APIs are
//! infallible. They surface from the explicit constructors (`Agent::new`,
//! `Dsn::parse`, `Config::load`) and are otherwise logged.

use thiserror::Error;

/// Main error type for the obs-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Connection string is not a well-formed absolute URI with a host
    #[error("malformed DSN: {0}")]
    MalformedDsn(String),

    /// Connection string carries no API key in the username position
    #[error("DSN must contain an API key as username")]
    MissingCredential,

    /// Connection string carries an `@` but the API key before it is empty
    #[error("DSN must contain a non-empty API key")]
    EmptyCredential,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Delivery to the collector failed
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for obs-core
pub type Result<T> = std::result::Result<T, Error>;
