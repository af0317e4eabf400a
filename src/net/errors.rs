//! Network error types for the codec and connection sessions.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors that can occur while talking to the server over one connection.
#[derive(Debug, Error)]
pub enum NetError {
    /// Nothing is listening at the endpoint.
    #[error("connection to {endpoint} refused")]
    ConnectionRefused { endpoint: String },

    /// The handshake did not complete in time.
    #[error("connection to {endpoint} timed out after {timeout:?}")]
    ConnectionTimeout { endpoint: String, timeout: Duration },

    /// The remote end closed the connection, or it was closed locally.
    #[error("connection closed")]
    ConnectionClosed,

    /// No envelope arrived within the caller's bound.
    #[error("no message received within {0:?}")]
    ReceiveTimeout(Duration),

    /// The bytes were not a well-formed envelope, or its payload
    /// did not match the shape its type requires.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Tried to send on a closed session.
    #[error("not connected")]
    NotConnected,

    /// Any other WebSocket failure.
    #[error("transport error: {0}")]
    Transport(#[from] Box<tungstenite::Error>),
}

impl NetError {
    /// Whether this error means the connection is gone for good.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::NotConnected | Self::Transport(_)
        )
    }
}

impl From<tungstenite::Error> for NetError {
    fn from(error: tungstenite::Error) -> Self {
        Self::Transport(Box::new(error))
    }
}

/// Result type for network operations
pub type Result<T> = std::result::Result<T, NetError>;
