//! Connection state published on the state bus.

/// Where the managed connection currently stands.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Default)]
pub enum ConnectionState {
    /// No socket. Initial state, and the state after any close or failure
    #[default]
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Socket open
    Connected,
    /// A close has started
    Disconnecting,
    /// Open and flagged usable by the application protocol
    Ready,
}

impl ConnectionState {
    /// Whether a socket handle exists (anything but `Disconnected`).
    pub fn is_live(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnecting => write!(f, "disconnecting"),
            ConnectionState::Ready => write!(f, "ready"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(!ConnectionState::default().is_live());
    }

    #[test]
    fn test_live_states() {
        assert!(ConnectionState::Connecting.is_live());
        assert!(ConnectionState::Connected.is_live());
        assert!(ConnectionState::Disconnecting.is_live());
        assert!(ConnectionState::Ready.is_live());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
    }
}
