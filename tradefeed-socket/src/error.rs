//! Error types for the tradefeed-socket crate.

use socket_transport::TransportError;

/// Errors returned to callers of the connection manager.
///
/// Transport failures after a handshake has started are never returned here;
/// they are logged and show up only as state transitions.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The handshake request could not be built
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// `send` was called with no socket handle
    #[error("Not connected")]
    NotConnected,

    /// The socket handle no longer accepts frames
    #[error("Send failed: socket handle is closed")]
    SendFailed,

    /// The manager was created outside a tokio runtime
    #[error("No tokio runtime available")]
    NoRuntime,

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Convenience type alias for Results using ConnectionError.
pub type Result<T> = std::result::Result<T, ConnectionError>;
