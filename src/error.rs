//! Error types for the Kotoba Battle client.

use thiserror::Error;

/// Errors that can occur when using the Kotoba Battle client.
#[derive(Debug, Error)]
pub enum BattleClientError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport. Covers abnormal
    /// connection closes (any close status other than normal closure).
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed and can no longer be used.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active session, but the client
    /// has disconnected.
    #[error("not connected to server")]
    NotConnected,

    /// Failed to obtain a battle token from the supplier. Credential failures
    /// are session-fatal and are never retried internally.
    #[error("battle token fetch failed: {0}")]
    TokenFetch(String),

    /// The connection could not be (re)established within the bounded retry
    /// policy.
    #[error("connection failed after {attempts} attempt(s)")]
    ConnectionFailed {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The server sent a protocol-level `ERROR` message.
    #[error("server error: {message}")]
    ServerError {
        /// Human-readable error message from the server.
        message: String,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Kotoba Battle client operations.
pub type Result<T> = std::result::Result<T, BattleClientError>;
