//! Error types for the socket-transport crate.

/// Errors raised while preparing a handshake.
///
/// Failures after the handshake has started are not errors at this level;
/// they are reported as [`crate::TransportEvent::Failed`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The address is not an absolute `ws://` or `wss://` URL
    #[error("Invalid socket address {address}: {reason}")]
    InvalidAddress {
        /// The rejected address
        address: String,
        /// Why it was rejected
        reason: String,
    },

    /// The token cannot be carried in an HTTP header
    #[error("Invalid auth token: {0}")]
    InvalidToken(String),

    /// The upgrade request could not be built
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// No tokio runtime to run socket tasks on
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

/// Convenience type alias for Results using TransportError.
pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let error = TransportError::InvalidAddress {
            address: "http://host".to_string(),
            reason: "unsupported scheme".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid socket address http://host: unsupported scheme"
        );

        let error = TransportError::InvalidToken("contains newline".to_string());
        assert_eq!(error.to_string(), "Invalid auth token: contains newline");

        let error = TransportError::Handshake("bad uri".to_string());
        assert_eq!(error.to_string(), "Handshake error: bad uri");
    }
}
