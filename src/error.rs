//! Error types for the UOF client

use thiserror::Error;

/// Errors that can occur when using the UOF client
#[derive(Error, Debug)]
pub enum UofError {
    /// A configured endpoint could not be turned into a request
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Connecting to the feed failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// The WebSocket failed while open
    #[error("Transport error: {0}")]
    Transport(String),

    /// The API answered with a non-success status
    #[error("HTTP {status}: {reason}")]
    Http { status: u16, reason: String },

    /// The API request could not be sent or its body could not be decoded
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Failed to serialize/deserialize a message
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `connect()` was called outside of a Tokio runtime
    #[error("No async runtime available")]
    NoRuntime,
}

/// Result type for UOF client operations
pub type Result<T> = std::result::Result<T, UofError>;
