//! Error types for the presence service

use thiserror::Error;

/// Result type alias for presence operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the presence service
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The face-count source could not be acquired
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single capture or classification attempt failed
    #[error("capture failed: {0}")]
    Capture(String),

    /// API server error
    #[error("server error: {0}")]
    Server(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
