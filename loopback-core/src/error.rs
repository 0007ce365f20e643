//! Error types for interception operations

use thiserror::Error;

/// Main error type for interceptor operations
///
/// None of these ever cross the dispatch boundary: a request that hits a
/// fault simply proceeds unmodified. They surface at startup (configuration,
/// catalog, payloads) and at the host bridge (protocol, channel).
#[derive(Debug, Error)]
pub enum InterceptorError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Rule catalog errors
    #[error("Catalog error: {0}")]
    Catalog(String),
    /// Payload construction or decoding errors
    #[error("Payload error: {0}")]
    Payload(String),
    /// Malformed host protocol messages
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// The event actor is no longer running
    #[error("Event channel closed")]
    ChannelClosed,
    /// Network errors (admin server, relay)
    #[error("Network error: {0}")]
    Network(String),
    /// General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fault raised by a dynamic rule handler
///
/// The dispatcher absorbs it and lets the request through.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// The handler failed while computing its response
    #[error("handler failed: {0}")]
    Failed(String),
    /// The handler panicked
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Build a generic failure from anything printable
    pub fn failed(msg: impl Into<String>) -> Self {
        HandlerError::Failed(msg.into())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for InterceptorError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        InterceptorError::ChannelClosed
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for InterceptorError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        InterceptorError::ChannelClosed
    }
}
