use thiserror::Error;

/// Result type for StreamMagic operations
pub type Result<T> = std::result::Result<T, StreamMagicError>;

/// Errors that can occur when interacting with StreamMagic devices
#[derive(Error, Debug)]
pub enum StreamMagicError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection was closed while a request or subscription was outstanding
    #[error("connection lost")]
    ConnectionLost,

    /// Operation requires an established connection
    #[error("not connected to device")]
    NotConnected,

    /// Caller-supplied deadline elapsed before a response arrived
    #[error("request timed out")]
    RequestTimeout,

    /// Device answered with a non-success result code
    #[error("device rejected request ({code}): {message}")]
    DeviceRejected {
        /// Result code reported by the device
        code: i64,
        /// Human-readable status from the device
        message: String,
    },

    /// Device refused a subscription during connection setup
    #[error("device rejected subscription on {path} ({code}): {message}")]
    SubscriptionRejected {
        /// Path the subscription was issued on
        path: String,
        /// Result code reported by the device
        code: i64,
        /// Human-readable status from the device
        message: String,
    },

    /// Frame could not be parsed into a message
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Response was well-formed but its payload had an unexpected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Caller-side parameter validation failed
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
