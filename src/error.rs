//! Error types for the party room client.

use thiserror::Error;

/// Errors that can occur when using the party room client.
#[derive(Debug, Error)]
pub enum PartyRoomError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message or session record.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The background driver task has exited; the handle can no longer be used.
    #[error("client has shut down")]
    ClientShutDown,

    /// The durable session storage backend failed.
    #[error("session storage error: {0}")]
    Storage(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for party room client operations.
pub type Result<T> = std::result::Result<T, PartyRoomError>;
